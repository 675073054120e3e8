use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::slugify;
use bazaar_db::CategoryRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::categories::parse_rank_param;
use super::{map_lookup_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CreateCategoryRequest {
    pub rank: String,
    pub name: String,
    pub slug: Option<String>,
    pub image_ref: Option<String>,
    pub parent_id: Option<i64>,
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryRow>>), ApiError> {
    let rank = parse_rank_param(&req_id, &body.rank)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "category name must be non-empty",
        ));
    }
    let slug = body
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| slugify(name), String::from);

    let row = bazaar_db::create_category(
        &state.pool,
        rank,
        name,
        &slug,
        body.image_ref.as_deref(),
        body.parent_id,
    )
    .await
    .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "parent category"))?;

    tracing::info!(category_id = row.id, %rank, %slug, "category created");
    Ok((StatusCode::CREATED, ApiResponse::new(row, req_id.0)))
}

pub(super) async fn delete_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    bazaar_db::soft_delete_category(&state.pool, id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "category"))?;

    tracing::info!(category_id = id, "category soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

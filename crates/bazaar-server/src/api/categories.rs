use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use bazaar_core::{CategoryRank, CategoryRef};
use bazaar_db::{CategoryRow, ResolvedCategory};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, map_lookup_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ChildrenQuery {
    pub parent_id: Option<i64>,
}

pub(super) fn parse_rank_param(req_id: &RequestId, raw: &str) -> Result<CategoryRank, ApiError> {
    raw.parse::<CategoryRank>()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))
}

pub(super) async fn list_by_rank(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rank): Path<String>,
) -> Result<Json<ApiResponse<Vec<CategoryRow>>>, ApiError> {
    let rank = parse_rank_param(&req_id, &rank)?;
    let rows = bazaar_db::list_categories_by_rank(&state.pool, rank)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(rows, req_id.0))
}

/// Options for a cascading select: the children of `parent_id` at `rank`.
pub(super) async fn list_children(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rank): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<ApiResponse<Vec<CategoryRow>>>, ApiError> {
    let rank = parse_rank_param(&req_id, &rank)?;
    let rows = bazaar_db::list_children(&state.pool, rank, query.parent_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(rows, req_id.0))
}

pub(super) async fn resolve(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((rank, id_or_slug)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ResolvedCategory>>, ApiError> {
    let rank = parse_rank_param(&req_id, &rank)?;
    let resolved =
        bazaar_db::resolve_category(&state.pool, rank, &CategoryRef::parse(&id_or_slug))
            .await
            .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "category"))?;

    Ok(ApiResponse::new(resolved, req_id.0))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::{
    normalize, CategoryFilter, CategoryRank, CategoryRef, ListingConfig, ListingKind, Page,
    ProductCard, RatingSummary,
};
use bazaar_db::{DbError, NewRating, ProductScope};
use serde::Deserialize;

use crate::middleware::{AuthUser, RequestId};

use super::{map_db_error, map_lookup_error, ApiError, ApiResponse, AppState};

const DEFAULT_PRODUCT_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub(super) struct CatalogQuery {
    pub rank: Option<String>,
    pub category_id: Option<i64>,
    pub category_slug: Option<String>,
    pub sort: Option<String>,
    pub page_size: Option<i64>,
    /// Name search, combinable with the category filter.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RateRequest {
    /// 1 to 5 stars.
    pub rate: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Outcome of turning `rank` + `category_id`/`category_slug` into a filter.
#[derive(Debug, PartialEq, Eq)]
enum FilterResolution {
    Unfiltered,
    Filter(CategoryFilter),
    /// The referenced category does not exist; the listing is empty.
    Missing,
}

fn parse_rank(raw: Option<&str>) -> Result<Option<CategoryRank>, String> {
    match raw.map(str::trim) {
        None | Some("" | "all") => Ok(None),
        Some(value) => value
            .parse::<CategoryRank>()
            .map(Some)
            .map_err(|e| e.to_string()),
    }
}

fn category_ref(query: &CatalogQuery) -> Option<CategoryRef> {
    if let Some(id) = query.category_id {
        return Some(CategoryRef::Id(id));
    }
    query
        .category_slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| CategoryRef::Slug(s.to_string()))
}

async fn resolve_filter(
    state: &AppState,
    req_id: &RequestId,
    query: &CatalogQuery,
) -> Result<FilterResolution, ApiError> {
    let rank = parse_rank(query.rank.as_deref())
        .map_err(|msg| ApiError::new(req_id.0.clone(), "validation_error", msg))?;
    let Some(rank) = rank else {
        return Ok(FilterResolution::Unfiltered);
    };
    let Some(reference) = category_ref(query) else {
        return Err(ApiError::new(
            req_id.0.clone(),
            "validation_error",
            "category_id or category_slug is required with rank",
        ));
    };

    match bazaar_db::resolve_category(&state.pool, rank, &reference).await {
        Ok(resolved) => Ok(FilterResolution::Filter(resolved.filter)),
        Err(DbError::NotFound) => Ok(FilterResolution::Missing),
        Err(e) => Err(map_db_error(req_id.0.clone(), &e)),
    }
}

pub(super) async fn list_catalog_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ApiResponse<Page<ProductCard>>>, ApiError> {
    let filter = match resolve_filter(&state, &req_id, &query).await? {
        FilterResolution::Unfiltered => None,
        FilterResolution::Filter(filter) => Some(filter),
        FilterResolution::Missing => {
            return Ok(ApiResponse::new(Page::empty(), req_id.0));
        }
    };

    let normalized = normalize(
        query.sort.as_deref(),
        filter,
        query.page_size,
        ListingConfig::default_page_size(ListingKind::Shop),
    );

    let scope = ProductScope::storefront(filter).with_search(query.q.as_deref());
    let page = bazaar_db::fetch_page(&state.pool, &normalized, &scope)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(page, req_id.0))
}

pub(super) async fn list_all_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<Vec<ProductCard>>>, ApiError> {
    let limit = bazaar_core::clamp_page_size(query.limit, DEFAULT_PRODUCT_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let products = bazaar_db::list_products(&state.pool, limit, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(products, req_id.0))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ProductCard>>, ApiError> {
    let row = bazaar_db::get_product_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "product"))?;

    Ok(ApiResponse::new(ProductCard::from(row), req_id.0))
}

/// Rates a product as the signed-in user and returns the new aggregate.
pub(super) async fn rate_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(auth): Extension<AuthUser>,
    Path(slug): Path<String>,
    Json(body): Json<RateRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RatingSummary>>), ApiError> {
    let comment = body.comment.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let summary = bazaar_db::rate_product(
        &state.pool,
        &NewRating {
            product_slug: &slug,
            user_id: auth.user_id,
            rate: body.rate,
            comment,
        },
    )
    .await
    .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "product"))?;

    Ok((StatusCode::CREATED, ApiResponse::new(summary, req_id.0)))
}

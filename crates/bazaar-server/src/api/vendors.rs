use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use bazaar_core::{normalize, ListingConfig, ListingKind, Page, ProductCard, VendorCard};
use bazaar_db::{ProductScope, VendorRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, map_lookup_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct DirectoryQuery {
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StorefrontQuery {
    pub sort: Option<String>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct VendorDetail {
    id: i64,
    display_name: String,
    slug: String,
    address: Option<String>,
    contact_email: Option<String>,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<VendorRow> for VendorDetail {
    fn from(row: VendorRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            slug: row.slug,
            address: row.address,
            contact_email: row.contact_email,
            phone: row.phone,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_vendors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<ApiResponse<Page<VendorCard>>>, ApiError> {
    let page_size = bazaar_core::clamp_page_size(
        query.page_size,
        ListingConfig::default_page_size(ListingKind::VendorDirectory),
    );
    let page = bazaar_db::fetch_vendor_directory_page(&state.pool, page_size)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(page, req_id.0))
}

pub(super) async fn get_vendor(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<VendorDetail>>, ApiError> {
    let vendor = bazaar_db::get_vendor_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "vendor"))?;

    Ok(ApiResponse::new(VendorDetail::from(vendor), req_id.0))
}

pub(super) async fn list_vendor_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Query(query): Query<StorefrontQuery>,
) -> Result<Json<ApiResponse<Page<ProductCard>>>, ApiError> {
    let vendor = bazaar_db::get_vendor_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "vendor"))?;

    let normalized = normalize(
        query.sort.as_deref(),
        None,
        query.page_size,
        ListingConfig::default_page_size(ListingKind::VendorStorefront),
    );
    let page = bazaar_db::fetch_page(
        &state.pool,
        &normalized,
        &ProductScope::vendor_storefront(vendor.id),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(page, req_id.0))
}

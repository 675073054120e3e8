//! Vendor dashboard: the caller's own products and orders.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::{normalize, ListingConfig, ListingKind, OrderCard, Page, ProductCard};
use bazaar_db::{NewProduct, ProductScope, VendorRow, Visibility};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::{AuthUser, RequestId};

use super::{map_db_error, map_lookup_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct DashboardProductQuery {
    pub status: Option<String>,
    pub sort: Option<String>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DashboardOrderQuery {
    pub status: Option<String>,
    pub page_size: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
    pub super_category_id: Option<i64>,
    pub main_category_id: Option<i64>,
    pub sub_category_id: Option<i64>,
    pub mini_category_id: Option<i64>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct CreatedProduct {
    id: i64,
    slug: String,
}

async fn own_vendor(
    state: &AppState,
    req_id: &RequestId,
    user: AuthUser,
) -> Result<VendorRow, ApiError> {
    bazaar_db::get_vendor_by_user_id(&state.pool, user.user_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "vendor profile"))
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardProductQuery>,
) -> Result<Json<ApiResponse<Page<ProductCard>>>, ApiError> {
    let vendor = own_vendor(&state, &req_id, user).await?;

    let normalized = normalize(
        query.sort.as_deref(),
        None,
        query.page_size,
        ListingConfig::default_page_size(ListingKind::VendorProducts),
    );
    let scope = ProductScope::vendor_dashboard(
        vendor.id,
        Visibility::from_status(query.status.as_deref()),
    );
    let page = bazaar_db::fetch_page(&state.pool, &normalized, &scope)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(page, req_id.0))
}

pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedProduct>>), ApiError> {
    let vendor = own_vendor(&state, &req_id, user).await?;

    let product = NewProduct {
        vendor_id: vendor.id,
        name: body.name,
        description: body.description,
        price: body.price,
        discount_price: body.discount_price,
        images: body.images,
        super_category_id: body.super_category_id,
        main_category_id: body.main_category_id,
        sub_category_id: body.sub_category_id,
        mini_category_id: body.mini_category_id,
        in_stock: body.in_stock,
        is_active: body.is_active,
        ..NewProduct::default()
    };
    let (id, slug) = bazaar_db::create_product(&state.pool, &product)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "category"))?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(CreatedProduct { id, slug }, req_id.0),
    ))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<AuthUser>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let vendor = own_vendor(&state, &req_id, user).await?;

    bazaar_db::soft_delete_product(&state.pool, vendor.id, &slug)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "product"))?;

    tracing::info!(vendor_id = vendor.id, %slug, "product soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardOrderQuery>,
) -> Result<Json<ApiResponse<Page<OrderCard>>>, ApiError> {
    let vendor = own_vendor(&state, &req_id, user).await?;

    let page_size = bazaar_core::clamp_page_size(
        query.page_size,
        ListingConfig::default_page_size(ListingKind::VendorOrders),
    );
    let page = bazaar_db::fetch_vendor_orders_page(
        &state.pool,
        vendor.id,
        query.status.as_deref(),
        page_size,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(page, req_id.0))
}

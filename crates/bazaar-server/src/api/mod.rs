mod admin;
mod auth;
mod catalog;
mod categories;
mod dashboard;
mod vendors;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use bazaar_core::{AppConfig, AppError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{JwtKeys, OtpMailer, Role};
use crate::middleware::{
    enforce_rate_limit, request_id, require_access_token, require_role, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub mailer: Arc<dyn OtpMailer>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AppConfig>, mailer: Arc<dyn OtpMailer>) -> Self {
        let jwt = Arc::new(JwtKeys::from_config(&config));
        Self {
            pool,
            config,
            jwt,
            mailer,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    pub fn from_app(request_id: impl Into<String>, error: &AppError) -> Self {
        let code = match error {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Auth(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::Transient(_) => "unavailable",
        };
        Self::new(request_id, code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &bazaar_db::DbError) -> ApiError {
    match error.to_app_error() {
        Some(app @ AppError::Transient(_)) => {
            tracing::warn!(error = %error, "database unavailable");
            ApiError::new(request_id, "unavailable", app.to_string())
        }
        Some(app) => ApiError::from_app(request_id, &app),
        None => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

/// Like [`map_db_error`] but names the missing entity on `NotFound`.
pub(super) fn map_lookup_error(
    request_id: String,
    error: &bazaar_db::DbError,
    entity: &str,
) -> ApiError {
    if matches!(error, bazaar_db::DbError::NotFound) {
        ApiError::new(request_id, "not_found", format!("{entity} not found"))
    } else {
        map_db_error(request_id, error)
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/catalog/products", get(catalog::list_catalog_products))
        .route("/api/v1/products", get(catalog::list_all_products))
        .route("/api/v1/products/{slug}", get(catalog::get_product))
        .route("/api/v1/categories/{rank}", get(categories::list_by_rank))
        .route(
            "/api/v1/categories/{rank}/children",
            get(categories::list_children),
        )
        .route(
            "/api/v1/categories/{rank}/{id_or_slug}",
            get(categories::resolve),
        )
        .route("/api/v1/vendors", get(vendors::list_vendors))
        .route("/api/v1/vendors/{slug}", get(vendors::get_vendor))
        .route(
            "/api/v1/vendors/{slug}/products",
            get(vendors::list_vendor_products),
        )
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/otp/request", post(auth::request_otp))
        .route("/api/v1/auth/otp/verify", post(auth::verify_otp))
        .route("/api/v1/auth/refresh", post(auth::refresh))
}

fn vendor_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/vendor/products",
            get(dashboard::list_products).post(dashboard::create_product),
        )
        .route(
            "/api/v1/vendor/products/{slug}",
            delete(dashboard::delete_product),
        )
        .route("/api/v1/vendor/orders", get(dashboard::list_orders))
        .route_layer(axum::middleware::from_fn_with_state(
            Role::Vendor,
            require_role,
        ))
}

fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/categories", post(admin::create_category))
        .route(
            "/api/v1/admin/categories/{id}",
            delete(admin::delete_category),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            Role::Admin,
            require_role,
        ))
}

fn protected_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route(
            "/api/v1/products/{slug}/ratings",
            post(catalog::rate_product),
        )
        .merge(vendor_router())
        .merge(admin_router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_access_token,
        ))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let api = Router::new()
        .merge(public_router())
        .merge(protected_router(&state))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ));

    Router::new()
        .route("/api/v1/health", get(health))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match bazaar_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[must_use]
pub fn rate_limit_state(config: &AppConfig) -> RateLimitState {
    RateLimitState::new(config.rate_limit_per_minute, Duration::from_secs(60))
}

#[cfg(test)]
mod tests;

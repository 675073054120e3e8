use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header::AUTHORIZATION, Request};
use bazaar_core::{CategoryRank, Environment};
use bazaar_db::{NewProduct, NewUser, NewVendor};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::auth::LogMailer;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .expect("mailer lock")
            .last()
            .map(|(_, code)| code.clone())
    }
}

impl OtpMailer for RecordingMailer {
    fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("mailer lock")
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        log_level: "debug".to_string(),
        seed_path: "./config/catalog.yaml".into(),
        jwt_secret: "test-secret-test-secret-test-secret".to_string(),
        access_token_ttl_mins: 60,
        refresh_token_ttl_days: 7,
        otp_ttl_mins: 10,
        otp_max_attempts: 3,
        rate_limit_per_minute: 1_000,
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
    }
}

fn test_state(pool: sqlx::PgPool, mailer: Arc<dyn OtpMailer>) -> AppState {
    AppState::new(pool, Arc::new(test_config()), mailer)
}

fn test_app(state: AppState) -> Router {
    build_app(state, RateLimitState::new(1_000, Duration::from_secs(60)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

async fn seed_vendor(pool: &sqlx::PgPool, slug: &str) -> (i64, i64) {
    let user = bazaar_db::create_user(
        pool,
        &NewUser {
            email: &format!("{slug}@example.com"),
            username: slug,
            password_hash: None,
            first_name: None,
            last_name: None,
            role: "vendor",
        },
    )
    .await
    .expect("vendor user");
    let vendor = bazaar_db::create_vendor(
        pool,
        &NewVendor {
            user_id: user.id,
            display_name: &slug.to_uppercase(),
            slug,
            address: None,
            contact_email: None,
            phone: None,
        },
    )
    .await
    .expect("vendor");
    (user.id, vendor.id)
}

async fn seed_product(pool: &sqlx::PgPool, vendor_id: i64, name: &str, cents: i64, category: i64) {
    bazaar_db::create_product(
        pool,
        &NewProduct {
            vendor_id,
            name: name.to_string(),
            price: Decimal::new(cents, 2),
            super_category_id: Some(category),
            in_stock: true,
            is_active: true,
            ..NewProduct::default()
        },
    )
    .await
    .expect("product");
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("unauthorized", StatusCode::UNAUTHORIZED),
        ("forbidden", StatusCode::FORBIDDEN),
        ("conflict", StatusCode::CONFLICT),
        ("unavailable", StatusCode::SERVICE_UNAVAILABLE),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "boom").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[test]
fn app_errors_keep_their_message() {
    let error = ApiError::from_app("req-1", &AppError::Conflict("Email already exists".into()));
    assert_eq!(error.error.code, "conflict");
    assert_eq!(error.error.message, "Email already exists");
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: sqlx::PgPool) {
    let app = test_app(test_state(pool, Arc::new(LogMailer)));
    let (status, json) = send(app, get("/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");
    assert!(json["meta"]["request_id"].is_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn catalog_filters_by_category_slug_and_sorts(pool: sqlx::PgPool) {
    let electronics = bazaar_db::create_category(
        &pool,
        CategoryRank::Super,
        "Electronics",
        "electronics",
        None,
        None,
    )
    .await
    .expect("category");
    let books =
        bazaar_db::create_category(&pool, CategoryRank::Super, "Books", "books", None, None)
            .await
            .expect("category");
    let (_, vendor_id) = seed_vendor(&pool, "gadgets").await;
    seed_product(&pool, vendor_id, "Phone", 50_000, electronics.id).await;
    seed_product(&pool, vendor_id, "Cable", 1_000, electronics.id).await;
    seed_product(&pool, vendor_id, "Novel", 1_500, books.id).await;

    let app = test_app(test_state(pool, Arc::new(LogMailer)));
    let (status, json) = send(
        app,
        get("/api/v1/catalog/products?rank=super&category_slug=electronics&sort=price-low&page_size=1"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_matched"], 2);
    assert_eq!(json["data"]["exhausted"], false);
    let items = json["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["slug"], "cable");
}

#[sqlx::test(migrations = "../../migrations")]
async fn catalog_search_narrows_by_name_within_category(pool: sqlx::PgPool) {
    let electronics = bazaar_db::create_category(
        &pool,
        CategoryRank::Super,
        "Electronics",
        "electronics",
        None,
        None,
    )
    .await
    .expect("category");
    let books =
        bazaar_db::create_category(&pool, CategoryRank::Super, "Books", "books", None, None)
            .await
            .expect("category");
    let (_, vendor_id) = seed_vendor(&pool, "gadgets").await;
    seed_product(&pool, vendor_id, "Phone", 50_000, electronics.id).await;
    seed_product(&pool, vendor_id, "Phone Case", 1_500, electronics.id).await;
    seed_product(&pool, vendor_id, "Cable", 1_000, electronics.id).await;
    seed_product(&pool, vendor_id, "The Phonebook", 900, books.id).await;

    let state = test_state(pool, Arc::new(LogMailer));
    let (status, json) = send(
        test_app(state.clone()),
        get("/api/v1/catalog/products?q=PHONE&rank=super&category_slug=electronics&sort=price-low"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_matched"], 2);
    let slugs: Vec<&str> = json["data"]["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|item| item["slug"].as_str())
        .collect();
    assert_eq!(slugs, ["phone-case", "phone"]);

    let (_, json) = send(test_app(state.clone()), get("/api/v1/catalog/products?q=phone")).await;
    assert_eq!(json["data"]["total_matched"], 3);

    let (_, json) = send(test_app(state), get("/api/v1/catalog/products?q=%25")).await;
    assert_eq!(json["data"]["total_matched"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn ratings_update_the_product_aggregate(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let (_, vendor_id) = seed_vendor(&pool, "audio").await;
    let category =
        bazaar_db::create_category(&pool, CategoryRank::Super, "Audio", "audio", None, None)
            .await
            .expect("category");
    seed_product(&pool, vendor_id, "Speaker", 5_000, category.id).await;
    seed_product(&pool, vendor_id, "Headphones", 9_000, category.id).await;

    let mut tokens = Vec::new();
    for name in ["ann", "bob"] {
        let user = bazaar_db::create_user(
            &pool,
            &NewUser {
                email: &format!("{name}@example.com"),
                username: name,
                password_hash: None,
                first_name: None,
                last_name: None,
                role: "customer",
            },
        )
        .await
        .expect("customer");
        let pair = state.jwt.issue_pair(user.id, Role::Customer).expect("tokens");
        tokens.push(pair.access_token);
    }

    let rate = |slug: &str, rate: i64, token: &str| {
        post_json(
            &format!("/api/v1/products/{slug}/ratings"),
            &json!({"rate": rate, "comment": "ok"}),
            Some(token),
        )
    };

    let (status, json) = send(test_app(state.clone()), rate("speaker", 5, &tokens[0])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["rating_average"], 100);
    assert_eq!(json["data"]["rating_count"], 1);

    // Rating again replaces the earlier rate.
    let (_, json) = send(test_app(state.clone()), rate("speaker", 3, &tokens[0])).await;
    assert_eq!(json["data"]["rating_average"], 60);
    assert_eq!(json["data"]["rating_count"], 1);

    let (_, json) = send(test_app(state.clone()), rate("speaker", 4, &tokens[1])).await;
    assert_eq!(json["data"]["rating_average"], 70);
    assert_eq!(json["data"]["rating_count"], 2);

    let (status, _) = send(test_app(state.clone()), rate("headphones", 5, &tokens[1])).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, json) = send(
        test_app(state.clone()),
        get("/api/v1/catalog/products?sort=rating"),
    )
    .await;
    assert_eq!(json["data"]["items"][0]["slug"], "headphones");
    assert_eq!(json["data"]["items"][1]["rating_average"], 70);

    let (status, _) = send(test_app(state.clone()), rate("speaker", 6, &tokens[0])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(test_app(state.clone()), rate("no-such-thing", 4, &tokens[0])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "product not found");

    let anonymous = post_json(
        "/api/v1/products/speaker/ratings",
        &json!({"rate": 4}),
        None,
    );
    let (status, _) = send(test_app(state), anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn catalog_with_unknown_category_is_an_empty_page(pool: sqlx::PgPool) {
    let app = test_app(test_state(pool, Arc::new(LogMailer)));
    let (status, json) = send(
        app,
        get("/api/v1/catalog/products?rank=main&category_slug=does-not-exist"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_matched"], 0);
    assert_eq!(json["data"]["exhausted"], true);
    assert_eq!(json["data"]["items"], json!([]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_product_slug_is_404(pool: sqlx::PgPool) {
    let app = test_app(test_state(pool, Arc::new(LogMailer)));
    let (status, json) = send(app, get("/api/v1/products/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "product not found");
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_email_registration_is_a_conflict(pool: sqlx::PgPool) {
    let state = test_state(pool, Arc::new(LogMailer));
    let first = json!({
        "email": "Jane@Example.com",
        "username": "jane",
        "password": "hunter2hunter2",
    });
    let (status, json) = send(
        test_app(state.clone()),
        post_json("/api/v1/auth/register", &first, None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["user"]["email"], "jane@example.com");
    assert!(json["data"]["user"].get("password_hash").is_none());

    let second = json!({
        "email": "jane@example.com",
        "username": "jane2",
        "password": "hunter2hunter2",
    });
    let (status, json) = send(
        test_app(state),
        post_json("/api/v1/auth/register", &second, None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["message"], "Email already exists");
}

#[sqlx::test(migrations = "../../migrations")]
async fn vendor_registration_with_taken_store_name_writes_nothing(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let register = |email: &str, username: &str, store: &str| {
        json!({
            "email": email,
            "username": username,
            "password": "hunter2hunter2",
            "role": "vendor",
            "store_name": store,
        })
    };

    let (status, _) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/register",
            &register("one@example.com", "one", "My Shop"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/register",
            &register("two@example.com", "two", "My Shop"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["message"], "vendor slug 'my-shop' already exists");

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind("two@example.com")
        .fetch_one(&pool)
        .await
        .expect("count users");
    assert_eq!(orphans, 0);

    let (status, json) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/register",
            &register("two@example.com", "two", "Two's Shop"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let access = json["data"]["tokens"]["access_token"]
        .as_str()
        .expect("access token")
        .to_string();

    let (status, _) = send(
        test_app(state),
        get_authed("/api/v1/vendor/products", &access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn short_password_is_rejected(pool: sqlx::PgPool) {
    let app = test_app(test_state(pool, Arc::new(LogMailer)));
    let body = json!({"email": "a@example.com", "username": "a", "password": "short"});
    let (status, _) = send(app, post_json("/api/v1/auth/register", &body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../migrations")]
async fn password_login_accepts_username_or_email(pool: sqlx::PgPool) {
    let state = test_state(pool, Arc::new(LogMailer));
    let body = json!({"email": "sam@example.com", "username": "sam", "password": "correct-horse"});
    let (status, _) = send(
        test_app(state.clone()),
        post_json("/api/v1/auth/register", &body, None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for login in ["sam", "SAM@example.com"] {
        let body = json!({"login": login, "password": "correct-horse"});
        let (status, json) = send(
            test_app(state.clone()),
            post_json("/api/v1/auth/login", &body, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{login}");
        assert!(json["data"]["tokens"]["access_token"].is_string());
    }

    let body = json!({"login": "sam", "password": "wrong-horse"});
    let (status, _) = send(test_app(state), post_json("/api/v1/auth/login", &body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn otp_login_happy_path_consumes_the_token(pool: sqlx::PgPool) {
    let mailer = Arc::new(RecordingMailer::default());
    let state = test_state(pool, mailer.clone());

    let (status, json) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/otp/request",
            &json!({"email": "otp.user@example.com"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let temp_token = json["data"]["temp_token"]
        .as_str()
        .expect("temp token")
        .to_string();
    let code = mailer.last_code().expect("code delivered");

    let verify = json!({"temp_token": temp_token, "code": code});
    let (status, json) = send(
        test_app(state.clone()),
        post_json("/api/v1/auth/otp/verify", &verify, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["email"], "otp.user@example.com");
    assert_eq!(json["data"]["user"]["email_verified"], true);
    let access = json["data"]["tokens"]["access_token"]
        .as_str()
        .expect("access token")
        .to_string();

    let (status, json) = send(
        test_app(state.clone()),
        get_authed("/api/v1/auth/me", &access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["username"], "otp.user");

    let (status, _) = send(
        test_app(state),
        post_json("/api/v1/auth/otp/verify", &verify, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn expired_otp_is_unauthorized(pool: sqlx::PgPool) {
    let mailer = Arc::new(RecordingMailer::default());
    let state = test_state(pool.clone(), mailer.clone());

    let (status, json) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/otp/request",
            &json!({"email": "late@example.com"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let temp_token = json["data"]["temp_token"]
        .as_str()
        .expect("temp token")
        .to_string();
    let code = mailer.last_code().expect("code delivered");

    sqlx::query("UPDATE email_otps SET expires_at = NOW() - INTERVAL '1 minute'")
        .execute(&pool)
        .await
        .expect("backdate otp");

    let (status, json) = send(
        test_app(state),
        post_json(
            "/api/v1/auth/otp/verify",
            &json!({"temp_token": temp_token, "code": code}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");
    assert_eq!(json["error"]["message"], "code expired");
}

#[sqlx::test(migrations = "../../migrations")]
async fn refresh_token_issues_a_new_pair(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let (user_id, _) = seed_vendor(&pool, "refresher").await;
    let pair = state.jwt.issue_pair(user_id, Role::Vendor).expect("tokens");

    let (status, json) = send(
        test_app(state.clone()),
        post_json(
            "/api/v1/auth/refresh",
            &json!({"refresh_token": pair.refresh_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["token_type"], "Bearer");

    let (status, _) = send(
        test_app(state),
        post_json(
            "/api/v1/auth/refresh",
            &json!({"refresh_token": pair.access_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn vendor_routes_require_vendor_role(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let (vendor_user, _) = seed_vendor(&pool, "acme").await;

    let (status, _) = send(test_app(state.clone()), get("/api/v1/vendor/products")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let customer = state.jwt.issue_pair(9_999, Role::Customer).expect("tokens");
    let (status, json) = send(
        test_app(state.clone()),
        get_authed("/api/v1/vendor/products", &customer.access_token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "forbidden");

    let vendor = state.jwt.issue_pair(vendor_user, Role::Vendor).expect("tokens");
    let (status, json) = send(
        test_app(state),
        get_authed("/api/v1/vendor/products?status=inactive", &vendor.access_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["exhausted"], true);
}

#[sqlx::test(migrations = "../../migrations")]
async fn vendor_cannot_create_discount_equal_to_price(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let (vendor_user, _) = seed_vendor(&pool, "equal-discount").await;
    let token = state
        .jwt
        .issue_pair(vendor_user, Role::Vendor)
        .expect("tokens")
        .access_token;

    let body = json!({"name": "Mug", "price": "12.00", "discount_price": "12.00"});
    let (status, json) = send(
        test_app(state.clone()),
        post_json("/api/v1/vendor/products", &body, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let body = json!({"name": "Mug", "price": "12.00", "discount_price": "9.00"});
    let (status, json) = send(
        test_app(state),
        post_json("/api/v1/vendor/products", &body, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["slug"], "mug");
}

#[sqlx::test(migrations = "../../migrations")]
async fn admin_category_with_wrong_parent_rank_is_rejected(pool: sqlx::PgPool) {
    let state = test_state(pool.clone(), Arc::new(LogMailer));
    let root = bazaar_db::create_category(
        &pool,
        CategoryRank::Super,
        "Home",
        "home",
        None,
        None,
    )
    .await
    .expect("category");
    let admin = state
        .jwt
        .issue_pair(1, Role::Admin)
        .expect("tokens")
        .access_token;

    let body = json!({"rank": "sub", "name": "Lamps", "parent_id": root.id});
    let (status, _) = send(
        test_app(state.clone()),
        post_json("/api/v1/admin/categories", &body, Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({"rank": "main", "name": "Lighting", "parent_id": root.id});
    let (status, json) = send(
        test_app(state),
        post_json("/api/v1/admin/categories", &body, Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["slug"], "lighting");
}

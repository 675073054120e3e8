//! Registration, password login, email OTP login, token refresh.

use axum::{extract::State, http::StatusCode, Extension, Json};
use bazaar_core::slugify;
use bazaar_db::{NewEmailOtp, NewUser, NewVendorProfile, OtpCheck, UserRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    generate_otp_code, generate_temp_token, hash_password, hash_temp_token, is_valid_email,
    is_valid_otp_code, verify_password, Role, TokenPair, TokenType, MIN_PASSWORD_LEN,
};
use crate::middleware::{AuthUser, RequestId};

use super::{map_db_error, map_lookup_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `customer` (default) or `vendor`.
    pub role: Option<String>,
    /// Storefront name; required when registering as a vendor.
    pub store_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    /// Email or username.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OtpVerifyRequest {
    pub temp_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub(super) struct AuthPayload {
    user: UserRow,
    tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub(super) struct OtpIssued {
    temp_token: String,
    expires_at: DateTime<Utc>,
}

fn validation(req_id: &RequestId, message: impl Into<String>) -> ApiError {
    ApiError::new(req_id.0.clone(), "validation_error", message)
}

fn unauthorized(req_id: &RequestId, message: &str) -> ApiError {
    ApiError::new(req_id.0.clone(), "unauthorized", message)
}

/// Registration may only create customers and vendors.
fn parse_register_role(raw: Option<&str>) -> Result<Role, String> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(Role::Customer),
        Some(raw) => match raw.parse::<Role>()? {
            Role::Admin => Err("cannot register as admin".to_string()),
            role => Ok(role),
        },
    }
}

fn issue_tokens(
    state: &AppState,
    req_id: &RequestId,
    user: &UserRow,
) -> Result<TokenPair, ApiError> {
    let role = user.role.parse::<Role>().map_err(|e| {
        tracing::error!(user_id = user.id, error = %e, "stored role is invalid");
        ApiError::new(req_id.0.clone(), "internal_error", "account misconfigured")
    })?;
    state.jwt.issue_pair(user.id, role).map_err(|e| {
        tracing::error!(error = %e, "failed to sign tokens");
        ApiError::new(req_id.0.clone(), "internal_error", "failed to issue tokens")
    })
}

pub(super) async fn register(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthPayload>>), ApiError> {
    let email = body.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(validation(&req_id, "invalid email address"));
    }
    let username = body.username.trim();
    if username.is_empty() {
        return Err(validation(&req_id, "username must be non-empty"));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(validation(
            &req_id,
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let role = parse_register_role(body.role.as_deref()).map_err(|m| validation(&req_id, m))?;
    let store_name = match role {
        Role::Vendor => Some(
            body.store_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| validation(&req_id, "store_name is required for vendors"))?,
        ),
        _ => None,
    };

    let password_hash = hash_password(&body.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        ApiError::new(req_id.0.clone(), "internal_error", "failed to hash password")
    })?;

    let new_user = NewUser {
        email: &email,
        username,
        password_hash: Some(&password_hash),
        first_name: body.first_name.as_deref(),
        last_name: body.last_name.as_deref(),
        role: role.as_str(),
    };
    let user = match store_name {
        Some(store_name) => {
            let slug = slugify(store_name);
            let (user, vendor) = bazaar_db::create_vendor_account(
                &state.pool,
                &new_user,
                &NewVendorProfile {
                    display_name: store_name,
                    slug: &slug,
                    address: None,
                    phone: None,
                },
            )
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
            tracing::info!(user_id = user.id, vendor_id = vendor.id, "vendor created");
            user
        }
        None => bazaar_db::create_user(&state.pool, &new_user)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    };

    tracing::info!(user_id = user.id, %role, "user registered");
    let tokens = issue_tokens(&state, &req_id, &user)?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(AuthPayload { user, tokens }, req_id.0),
    ))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let user = bazaar_db::find_user_by_login(&state.pool, &body.login)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let Some(user) = user.filter(|u| {
        u.password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(&body.password, hash))
    }) else {
        return Err(unauthorized(&req_id, "invalid credentials"));
    };
    if !user.is_active {
        return Err(unauthorized(&req_id, "account is disabled"));
    }

    let tokens = issue_tokens(&state, &req_id, &user)?;
    Ok(ApiResponse::new(AuthPayload { user, tokens }, req_id.0))
}

/// Issues a code to the email's owner and a temp token to the caller.
pub(super) async fn request_otp(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<OtpRequest>,
) -> Result<Json<ApiResponse<OtpIssued>>, ApiError> {
    let email = body.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(validation(&req_id, "invalid email address"));
    }

    let code = generate_otp_code();
    let temp_token = generate_temp_token();
    let expires_at = bazaar_db::create_email_otp(
        &state.pool,
        &NewEmailOtp {
            email: &email,
            code: &code,
            temp_token_hash: &hash_temp_token(&temp_token),
            ttl_mins: state.config.otp_ttl_mins,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    state.mailer.deliver(&email, &code).map_err(|e| {
        tracing::error!(error = %e, "otp delivery failed");
        ApiError::new(req_id.0.clone(), "unavailable", "could not deliver code")
    })?;

    Ok(ApiResponse::new(
        OtpIssued {
            temp_token,
            expires_at,
        },
        req_id.0,
    ))
}

pub(super) async fn verify_otp(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<OtpVerifyRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let code = body.code.trim();
    if !is_valid_otp_code(code) {
        return Err(validation(&req_id, "code must be 6 digits"));
    }

    let check = bazaar_db::verify_email_otp(
        &state.pool,
        &hash_temp_token(body.temp_token.trim()),
        code,
        state.config.otp_max_attempts,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let email = match check {
        OtpCheck::Verified { email } => email,
        OtpCheck::Mismatch { attempts_left } => {
            return Err(ApiError::new(
                req_id.0,
                "unauthorized",
                format!("invalid code, {attempts_left} attempts left"),
            ));
        }
        OtpCheck::Expired => return Err(unauthorized(&req_id, "code expired")),
        OtpCheck::Exhausted => return Err(unauthorized(&req_id, "too many attempts")),
        OtpCheck::Consumed => return Err(unauthorized(&req_id, "code already used")),
        OtpCheck::Unknown => return Err(unauthorized(&req_id, "invalid or unknown token")),
    };

    let user = bazaar_db::upsert_verified_email_user(&state.pool, &email)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if !user.is_active {
        return Err(unauthorized(&req_id, "account is disabled"));
    }

    let tokens = issue_tokens(&state, &req_id, &user)?;
    Ok(ApiResponse::new(AuthPayload { user, tokens }, req_id.0))
}

/// Exchanges a refresh token for a fresh pair, re-reading the user's role.
pub(super) async fn refresh(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, ApiError> {
    let claims = state
        .jwt
        .decode(&body.refresh_token, TokenType::Refresh)
        .map_err(|e| {
            tracing::debug!(error = %e, "refresh token rejected");
            unauthorized(&req_id, "invalid or expired refresh token")
        })?;

    let user = match bazaar_db::get_user_by_id(&state.pool, claims.user_id).await {
        Ok(user) if user.is_active => user,
        Ok(_) | Err(bazaar_db::DbError::NotFound) => {
            return Err(unauthorized(&req_id, "account is unavailable"));
        }
        Err(e) => return Err(map_db_error(req_id.0.clone(), &e)),
    };

    let tokens = issue_tokens(&state, &req_id, &user)?;
    Ok(ApiResponse::new(tokens, req_id.0))
}

pub(super) async fn me(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<UserRow>>, ApiError> {
    let user = bazaar_db::get_user_by_id(&state.pool, auth.user_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "user"))?;

    Ok(ApiResponse::new(user, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_roles() {
        assert_eq!(parse_register_role(None), Ok(Role::Customer));
        assert_eq!(parse_register_role(Some("")), Ok(Role::Customer));
        assert_eq!(parse_register_role(Some("vendor")), Ok(Role::Vendor));
        assert!(parse_register_role(Some("admin")).is_err());
        assert!(parse_register_role(Some("wizard")).is_err());
    }
}

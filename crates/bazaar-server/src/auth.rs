//! Credentials: password hashing, JWT issue/verify, and OTP material.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TEMP_TOKEN_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

static OTP_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Roles and tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    sub: String,
    role: Role,
    token_type: TokenType,
    exp: u64,
    iat: u64,
}

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("expected a {expected:?} token")]
    WrongType { expected: TokenType },
    #[error("malformed subject")]
    BadSubject,
}

/// HS256 keys plus token lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    #[must_use]
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &bazaar_core::AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_ttl_mins),
            Duration::days(config.refresh_token_ttl_days),
        )
    }

    fn encode(
        &self,
        user_id: i64,
        role: Role,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RawClaims {
            sub: user_id.to_string(),
            role,
            token_type,
            exp: u64::try_from((now + ttl).timestamp()).unwrap_or(0),
            iat: u64::try_from(now.timestamp()).unwrap_or(0),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Jwt`] if signing fails.
    pub fn issue_pair(&self, user_id: i64, role: Role) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.encode(user_id, role, TokenType::Access, self.access_ttl)?,
            refresh_token: self.encode(user_id, role, TokenType::Refresh, self.refresh_ttl)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Verify signature and expiry, and that the token is of `expected` type.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] for an invalid, expired, or wrong-type token.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<RawClaims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )?;
        if data.claims.token_type != expected {
            return Err(TokenError::WrongType { expected });
        }
        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::BadSubject)?;
        Ok(Claims {
            user_id,
            role: data.claims.role,
        })
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns the argon2 error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Email and OTP material
// ---------------------------------------------------------------------------

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[must_use]
pub fn is_valid_otp_code(code: &str) -> bool {
    OTP_CODE_RE.is_match(code)
}

/// Six decimal digits, zero-padded.
#[must_use]
pub fn generate_otp_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

#[must_use]
pub fn generate_temp_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hex sha256; the only form of the temp token that is stored.
#[must_use]
pub fn hash_temp_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Delivery channel for one-time codes.
pub trait OtpMailer: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the code could not be handed off.
    fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log; for development and tests.
#[derive(Debug, Default)]
pub struct LogMailer;

impl OtpMailer for LogMailer {
    fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(%email, %code, "otp code issued");
        Ok(())
    }
}

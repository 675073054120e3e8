use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

const MIN_JWT_SECRET_LEN: usize = 32;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can feed a plain map.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let value = or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value <= 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let jwt_secret = require("BAZAAR_JWT_SECRET")?;
    if jwt_secret.len() < MIN_JWT_SECRET_LEN {
        return Err(invalid(
            "BAZAAR_JWT_SECRET",
            format!("must be at least {MIN_JWT_SECRET_LEN} characters"),
        ));
    }

    let env = parse_environment(&or_default("BAZAAR_ENV", "development"))?;
    let bind_addr = parse_addr("BAZAAR_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("BAZAAR_LOG_LEVEL", "info");
    let seed_path = PathBuf::from(or_default("BAZAAR_SEED_PATH", "./config/catalog.yaml"));

    let access_token_ttl_mins = parse_positive_i64("BAZAAR_ACCESS_TOKEN_TTL_MINS", "60")?;
    let refresh_token_ttl_days = parse_positive_i64("BAZAAR_REFRESH_TOKEN_TTL_DAYS", "7")?;
    let otp_ttl_mins = parse_positive_i64("BAZAAR_OTP_TTL_MINS", "10")?;
    let otp_max_attempts = i32::try_from(parse_u32("BAZAAR_OTP_MAX_ATTEMPTS", "3")?)
        .map_err(|e| invalid("BAZAAR_OTP_MAX_ATTEMPTS", e.to_string()))?;
    let rate_limit_per_minute = usize::try_from(parse_u32("BAZAAR_RATE_LIMIT_PER_MINUTE", "120")?)
        .map_err(|e| invalid("BAZAAR_RATE_LIMIT_PER_MINUTE", e.to_string()))?;

    let db_max_connections = parse_u32("BAZAAR_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("BAZAAR_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("BAZAAR_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        seed_path,
        jwt_secret,
        access_token_ttl_mins,
        refresh_token_ttl_days,
        otp_ttl_mins,
        otp_max_attempts,
        rate_limit_per_minute,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BAZAAR_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

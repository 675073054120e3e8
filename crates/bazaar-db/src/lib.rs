use bazaar_core::AppError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/bazaar-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_connections: read_u32("BAZAAR_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            min_connections: read_u32("BAZAAR_DB_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS),
            acquire_timeout_secs: read_u64(
                "BAZAAR_DB_ACQUIRE_TIMEOUT_SECS",
                DEFAULT_ACQUIRE_TIMEOUT_SECS,
            ),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &bazaar_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] bazaar_core::CoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Name of the violated unique constraint, if this is a `23505` error.
    #[must_use]
    pub fn unique_violation(&self) -> Option<String> {
        if let DbError::Sqlx(sqlx::Error::Database(db_err)) = self {
            if db_err.code().as_deref() == Some("23505") {
                return Some(db_err.constraint().unwrap_or_default().to_string());
            }
        }
        None
    }

    /// Pool exhaustion and I/O failures are worth retrying; query errors are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }

    /// Caller-facing classification, or `None` for unexpected failures that
    /// should surface as internal errors.
    #[must_use]
    pub fn to_app_error(&self) -> Option<AppError> {
        match self {
            DbError::NotFound => Some(AppError::NotFound("record not found".to_string())),
            DbError::Conflict(msg) => Some(AppError::Conflict(msg.clone())),
            DbError::Invalid(e) => Some(AppError::from(e.clone())),
            e if e.is_transient() => Some(AppError::Transient(e.to_string())),
            _ => None,
        }
    }
}

pub mod catalog;
pub mod categories;
pub mod orders;
pub mod otp;
pub mod products;
pub mod ratings;
pub mod seed;
pub mod users;
pub mod vendors;

pub use catalog::{
    count_products, fetch_page, find_products, get_product_by_slug, list_products,
    ProductCardRow, ProductScope, Visibility,
};
pub use categories::{
    create_category, get_category, list_categories_by_rank, list_children, resolve_category,
    soft_delete_category, CategoryRow, Crumb, ResolvedCategory,
};
pub use orders::{fetch_vendor_orders_page, insert_order, OrderRow};
pub use otp::{create_email_otp, purge_stale_otps, verify_email_otp, NewEmailOtp, OtpCheck};
pub use products::{create_product, soft_delete_product, NewProduct};
pub use ratings::{rate_product, NewRating};
pub use seed::{apply_seed, SeedSummary};
pub use users::{
    create_user, find_user_by_email, find_user_by_login, find_user_by_username, get_user_by_id,
    upsert_verified_email_user, NewUser, UserRow,
};
pub use vendors::{
    create_vendor, create_vendor_account, fetch_vendor_directory_page, get_vendor_by_slug,
    get_vendor_by_user_id, NewVendor, NewVendorProfile, VendorRow,
};

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` and pool settings from env.
///
/// # Errors
///
/// Returns [`DbError::MissingDatabaseUrl`] if `DATABASE_URL` is unset, or
/// [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, DbError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| DbError::MissingDatabaseUrl)?;
    let config = PoolConfig::from_env();
    connect_pool(&database_url, config)
        .await
        .map_err(DbError::from)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat that as zero.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

fn read_u32(var: &str, default: u32) -> u32 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_u64(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(DbError::NotFound.unique_violation().is_none());
        assert!(!DbError::NotFound.is_transient());
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn app_error_classification() {
        assert!(matches!(
            DbError::NotFound.to_app_error(),
            Some(AppError::NotFound(_))
        ));
        assert_eq!(
            DbError::Conflict("Email already exists".to_string()).to_app_error(),
            Some(AppError::Conflict("Email already exists".to_string()))
        );
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut)
            .to_app_error()
            .is_some_and(|e| e.is_transient()));
        assert!(DbError::Sqlx(sqlx::Error::RowNotFound).to_app_error().is_none());
    }
}

pub mod app_config;
pub mod cards;
pub mod catalog;
pub mod category;
pub mod config;
pub mod listing;
pub mod pricing;
pub mod rating;
pub mod seed;
pub mod slug;

pub use app_config::{AppConfig, Environment};
pub use cards::{OrderCard, ProductCard, VendorCard};
pub use catalog::{
    clamp_page_size, is_exhausted, normalize, Direction, NormalizedQuery, OrderField, Page,
    SortKey, MAX_PAGE_SIZE,
};
pub use category::{CategoryFilter, CategoryRank, CategoryRef};
pub use config::{load_app_config, load_app_config_from_env};
pub use listing::{ListingConfig, ListingKind};
pub use pricing::{discount_percent, validate_pricing};
pub use rating::{rating_percent, validate_rating, RatingSummary, MAX_RATE, MIN_RATE};
pub use seed::{load_seed, CatalogSeed, CategorySeed, ProductSeed, VendorSeed};
pub use slug::slugify;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read seed file {path}: {source}")]
    SeedFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed file: {0}")]
    SeedFileParse(#[from] serde_yaml::Error),

    #[error("seed validation failed: {0}")]
    Validation(String),
}

/// Domain validation failures raised by pure core logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid category rank: {0}")]
    InvalidRank(String),

    #[error("{0}")]
    InvalidPricing(String),

    #[error("{0}")]
    InvalidCategoryChain(String),

    #[error("{0}")]
    InvalidInput(String),
}

/// Error taxonomy shared by every layer that talks to a caller.
///
/// Storage and HTTP layers translate their own failures into one of these
/// variants before they reach a handler or the reveal controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Malformed input (missing email, bad price, unknown rank).
    #[error("{0}")]
    Validation(String),

    /// Unknown slug, category, product, or vendor.
    #[error("{0}")]
    NotFound(String),

    /// Invalid credentials, expired/consumed OTP, or missing permission.
    #[error("{0}")]
    Auth(String),

    /// Duplicate email/username/slug.
    #[error("{0}")]
    Conflict(String),

    /// Network or storage failure worth retrying.
    #[error("{0}")]
    Transient(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl AppError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

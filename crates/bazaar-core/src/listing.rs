//! Per-listing presets for the incremental reveal protocol.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingKind {
    /// Customer shop grid, optionally filtered by category.
    Shop,
    /// One vendor's public storefront.
    VendorStorefront,
    /// A vendor's own product table in the dashboard.
    VendorProducts,
    /// A vendor's order table in the dashboard.
    VendorOrders,
    /// Public vendor directory.
    VendorDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    pub kind: ListingKind,
    /// Path relative to the API base, e.g. `/api/v1/catalog/products`.
    pub endpoint: String,
    pub initial_page_size: i64,
    pub page_size_step: i64,
}

impl ListingConfig {
    #[must_use]
    pub fn preset(kind: ListingKind) -> Self {
        let (endpoint, size) = match kind {
            ListingKind::Shop => ("/api/v1/catalog/products", 10),
            // `{slug}` is substituted by the caller.
            ListingKind::VendorStorefront => ("/api/v1/vendors/{slug}/products", 10),
            ListingKind::VendorProducts => ("/api/v1/vendor/products", 10),
            ListingKind::VendorOrders => ("/api/v1/vendor/orders", 10),
            ListingKind::VendorDirectory => ("/api/v1/vendors", 12),
        };
        Self {
            kind,
            endpoint: endpoint.to_string(),
            initial_page_size: size,
            page_size_step: size,
        }
    }

    /// Substitutes `{slug}` in the endpoint template.
    #[must_use]
    pub fn with_slug(mut self, slug: &str) -> Self {
        self.endpoint = self.endpoint.replace("{slug}", slug);
        self
    }

    #[must_use]
    pub fn default_page_size(kind: ListingKind) -> i64 {
        Self::preset(kind).initial_page_size
    }
}

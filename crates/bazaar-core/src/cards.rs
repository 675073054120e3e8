//! Wire shapes for listing items, shared by the API and its clients.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product as shown in any product grid or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCard {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub discount_percent: u8,
    pub primary_image: Option<String>,
    pub images: Vec<String>,
    pub in_stock: bool,
    pub is_active: bool,
    pub rating_average: i16,
    pub rating_count: i32,
    pub vendor_name: String,
    pub vendor_slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCard {
    pub id: i64,
    pub display_name: String,
    pub slug: String,
    pub address: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCard {
    pub id: i64,
    pub status: String,
    pub total: Decimal,
    pub customer_email: String,
    pub created_at: DateTime<Utc>,
}

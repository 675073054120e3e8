//! Read-only order listing for the owning vendor.

use bazaar_core::{OrderCard, Page};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

pub const ORDER_STATUSES: [&str; 5] = ["pending", "processing", "shipped", "delivered", "cancelled"];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub status: String,
    pub total: Decimal,
    pub customer_email: String,
    pub created_at: DateTime<Utc>,
}

impl From<OrderRow> for OrderCard {
    fn from(row: OrderRow) -> Self {
        OrderCard {
            id: row.id,
            status: row.status,
            total: row.total,
            customer_email: row.customer_email,
            created_at: row.created_at,
        }
    }
}

/// Window `[0, page_size)` of a vendor's orders, newest first.
///
/// An unknown `status` is ignored rather than matching nothing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn fetch_vendor_orders_page(
    pool: &PgPool,
    vendor_id: i64,
    status: Option<&str>,
    page_size: i64,
) -> Result<Page<OrderCard>, DbError> {
    let status = status.filter(|s| ORDER_STATUSES.contains(s));

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders \
         WHERE vendor_id = $1 AND ($2::TEXT IS NULL OR status = $2)",
    )
    .bind(vendor_id)
    .bind(status)
    .fetch_one(pool)
    .await?;
    if total == 0 {
        return Ok(Page::empty());
    }

    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT o.id, o.status, o.total, u.email AS customer_email, o.created_at \
         FROM orders o \
         JOIN users u ON u.id = o.customer_id \
         WHERE o.vendor_id = $1 AND ($2::TEXT IS NULL OR o.status = $2) \
         ORDER BY o.created_at DESC, o.id ASC \
         LIMIT $3",
    )
    .bind(vendor_id)
    .bind(status)
    .bind(page_size)
    .fetch_all(pool)
    .await?;

    let items = rows.into_iter().map(OrderCard::from).collect();
    Ok(Page::from_window(items, page_size, total))
}

/// Insert an order; used by seeding and tests.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_order(
    pool: &PgPool,
    vendor_id: i64,
    customer_id: i64,
    status: &str,
    total: Decimal,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (vendor_id, customer_id, status, total) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(vendor_id)
    .bind(customer_id)
    .bind(status)
    .bind(total)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

//! Database operations for the `vendors` table.

use bazaar_core::{Page, VendorCard};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use crate::users::{insert_user, NewUser, UserRow};
use crate::DbError;

/// A row from the `vendors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorRow {
    pub id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub slug: String,
    pub address: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct VendorCardRow {
    id: i64,
    display_name: String,
    slug: String,
    address: Option<String>,
    contact_email: Option<String>,
    phone: Option<String>,
    product_count: i64,
    created_at: DateTime<Utc>,
}

impl From<VendorCardRow> for VendorCard {
    fn from(row: VendorCardRow) -> Self {
        VendorCard {
            id: row.id,
            display_name: row.display_name,
            slug: row.slug,
            address: row.address,
            contact_email: row.contact_email,
            phone: row.phone,
            product_count: row.product_count,
            created_at: row.created_at,
        }
    }
}

/// Input for [`create_vendor`].
#[derive(Debug, Clone)]
pub struct NewVendor<'a> {
    pub user_id: i64,
    pub display_name: &'a str,
    pub slug: &'a str,
    pub address: Option<&'a str>,
    pub contact_email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

const VENDOR_COLUMNS: &str =
    "id, user_id, display_name, slug, address, contact_email, phone, is_active, created_at";

/// Insert a vendor profile for a user.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the user already owns a vendor or the
/// slug is taken, or [`DbError::Sqlx`] on other failures.
pub async fn create_vendor(pool: &PgPool, vendor: &NewVendor<'_>) -> Result<VendorRow, DbError> {
    insert_vendor(pool, vendor).await
}

/// Storefront details for [`create_vendor_account`].
#[derive(Debug, Clone)]
pub struct NewVendorProfile<'a> {
    pub display_name: &'a str,
    pub slug: &'a str,
    pub address: Option<&'a str>,
    pub phone: Option<&'a str>,
}

/// Creates a vendor user and its vendor profile in one transaction.
///
/// Nothing is written unless both inserts succeed. The profile's contact
/// email is the user's email.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] on a duplicate email, username or vendor
/// slug, or [`DbError::Sqlx`] on other failures.
pub async fn create_vendor_account(
    pool: &PgPool,
    user: &NewUser<'_>,
    profile: &NewVendorProfile<'_>,
) -> Result<(UserRow, VendorRow), DbError> {
    let mut tx = pool.begin().await?;

    let user_row = insert_user(&mut *tx, user).await?;
    let vendor_row = insert_vendor(
        &mut *tx,
        &NewVendor {
            user_id: user_row.id,
            display_name: profile.display_name,
            slug: profile.slug,
            address: profile.address,
            contact_email: Some(user.email),
            phone: profile.phone,
        },
    )
    .await?;

    tx.commit().await?;
    Ok((user_row, vendor_row))
}

async fn insert_vendor<'e>(
    executor: impl PgExecutor<'e>,
    vendor: &NewVendor<'_>,
) -> Result<VendorRow, DbError> {
    let result = sqlx::query_as::<_, VendorRow>(&format!(
        "INSERT INTO vendors (user_id, display_name, slug, address, contact_email, phone) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {VENDOR_COLUMNS}"
    ))
    .bind(vendor.user_id)
    .bind(vendor.display_name)
    .bind(vendor.slug)
    .bind(vendor.address)
    .bind(vendor.contact_email)
    .bind(vendor.phone)
    .fetch_one(executor)
    .await;

    result.map_err(|e| {
        let err = DbError::from(e);
        match err.unique_violation() {
            Some(constraint) if constraint.contains("user_id") => {
                DbError::Conflict("user already owns a vendor".to_string())
            }
            Some(_) => DbError::Conflict(format!("vendor slug '{}' already exists", vendor.slug)),
            None => err,
        }
    })
}

/// Fetch an active vendor by slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no active vendor has this slug, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_vendor_by_slug(pool: &PgPool, slug: &str) -> Result<VendorRow, DbError> {
    sqlx::query_as::<_, VendorRow>(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE slug = $1 AND is_active = true"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetch the vendor owned by a user, active or not.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user owns no vendor, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_vendor_by_user_id(pool: &PgPool, user_id: i64) -> Result<VendorRow, DbError> {
    sqlx::query_as::<_, VendorRow>(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Window `[0, page_size)` of the public vendor directory, by display name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn fetch_vendor_directory_page(
    pool: &PgPool,
    page_size: i64,
) -> Result<Page<VendorCard>, DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendors WHERE is_active = true")
        .fetch_one(pool)
        .await?;
    if total == 0 {
        return Ok(Page::empty());
    }

    let rows = sqlx::query_as::<_, VendorCardRow>(
        "SELECT v.id, v.display_name, v.slug, v.address, v.contact_email, v.phone, \
                (SELECT COUNT(*) FROM products p \
                  WHERE p.vendor_id = v.id AND p.is_active AND p.deleted_at IS NULL) AS product_count, \
                v.created_at \
         FROM vendors v \
         WHERE v.is_active = true \
         ORDER BY v.display_name, v.id \
         LIMIT $1",
    )
    .bind(page_size)
    .fetch_all(pool)
    .await?;

    let items = rows.into_iter().map(VendorCard::from).collect();
    Ok(Page::from_window(items, page_size, total))
}

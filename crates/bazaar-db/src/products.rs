//! Product writes: creation with category-chain checks, and soft delete.

use bazaar_core::{slugify, validate_pricing, CategoryRank, CoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::categories::load_chain;
use crate::DbError;

const MAX_SLUG_SUFFIX: u32 = 100;

/// Input for [`create_product`]. At most one category ref per rank; any
/// subset may be given as long as they lie on one chain.
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub vendor_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub images: Vec<String>,
    pub super_category_id: Option<i64>,
    pub main_category_id: Option<i64>,
    pub sub_category_id: Option<i64>,
    pub mini_category_id: Option<i64>,
    pub in_stock: bool,
    pub is_active: bool,
    pub rating_average: i16,
    pub rating_count: i32,
}

impl NewProduct {
    fn category_refs(&self) -> [(CategoryRank, Option<i64>); 4] {
        [
            (CategoryRank::Super, self.super_category_id),
            (CategoryRank::Main, self.main_category_id),
            (CategoryRank::Sub, self.sub_category_id),
            (CategoryRank::Mini, self.mini_category_id),
        ]
    }
}

/// Fills missing ancestor refs from the chain of the deepest given ref.
///
/// `chain` is root-first as returned by [`load_chain`].
///
/// # Errors
///
/// Returns [`CoreError::InvalidCategoryChain`] when a given ref disagrees
/// with the chain.
fn reconcile_chain(
    given: [(CategoryRank, Option<i64>); 4],
    chain: &[(CategoryRank, i64)],
) -> Result<[Option<i64>; 4], CoreError> {
    let mut filled = [None; 4];
    for (rank, id) in chain {
        filled[usize::from(rank.level().unsigned_abs()) - 1] = Some(*id);
    }

    for (rank, id) in given {
        let slot = usize::from(rank.level().unsigned_abs()) - 1;
        if let Some(id) = id {
            if filled[slot] != Some(id) {
                return Err(CoreError::InvalidCategoryChain(format!(
                    "{rank} category {id} is not on the product's category chain"
                )));
            }
        }
    }

    Ok(filled)
}

async fn unique_slug(pool: &PgPool, base: &str) -> Result<String, DbError> {
    for n in 1..=MAX_SLUG_SUFFIX {
        let candidate = if n == 1 {
            base.to_string()
        } else {
            format!("{base}-{n}")
        };
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1)")
                .bind(&candidate)
                .fetch_one(pool)
                .await?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(DbError::Conflict(format!(
        "product slug '{base}' is exhausted"
    )))
}

/// Insert a product for a vendor and return its id and slug.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for bad pricing or an inconsistent category
/// chain, [`DbError::NotFound`] if the deepest category does not exist, or
/// [`DbError::Sqlx`] on failure.
pub async fn create_product(pool: &PgPool, product: &NewProduct) -> Result<(i64, String), DbError> {
    validate_pricing(product.price, product.discount_price)?;
    if product.name.trim().is_empty() {
        return Err(CoreError::InvalidInput("product name must be non-empty".to_string()).into());
    }

    let given = product.category_refs();
    let deepest = given.iter().rev().find_map(|(_, id)| *id);
    let categories = match deepest {
        Some(id) => {
            let chain = load_chain(pool, id).await?;
            if chain.is_empty() {
                return Err(DbError::NotFound);
            }
            let chain = chain
                .iter()
                .map(|row| Ok((row.category_rank()?, row.id)))
                .collect::<Result<Vec<_>, DbError>>()?;
            reconcile_chain(given, &chain)?
        }
        None => [None; 4],
    };

    let slug = unique_slug(pool, &slugify(&product.name)).await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products (vendor_id, name, slug, description, price, discount_price, images, \
                               super_category_id, main_category_id, sub_category_id, mini_category_id, \
                               in_stock, is_active, rating_average, rating_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING id",
    )
    .bind(product.vendor_id)
    .bind(&product.name)
    .bind(&slug)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.discount_price)
    .bind(&product.images)
    .bind(categories[0])
    .bind(categories[1])
    .bind(categories[2])
    .bind(categories[3])
    .bind(product.in_stock)
    .bind(product.is_active)
    .bind(product.rating_average)
    .bind(product.rating_count)
    .fetch_one(pool)
    .await?;

    tracing::info!(product_id = id, vendor_id = product.vendor_id, %slug, "product created");
    Ok((id, slug))
}

/// Soft-delete a vendor's product by slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the vendor has no live product with this
/// slug, or [`DbError::Sqlx`] on failure.
pub async fn soft_delete_product(pool: &PgPool, vendor_id: i64, slug: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET deleted_at = NOW(), updated_at = NOW() \
         WHERE vendor_id = $1 AND slug = $2 AND deleted_at IS NULL",
    )
    .bind(vendor_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

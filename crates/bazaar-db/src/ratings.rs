//! Database operations for `product_ratings` and the product aggregate.

use bazaar_core::{rating_percent, validate_rating, RatingSummary};
use sqlx::PgPool;

use crate::DbError;

/// Input for [`rate_product`].
#[derive(Debug, Clone)]
pub struct NewRating<'a> {
    pub product_slug: &'a str,
    pub user_id: i64,
    pub rate: i16,
    pub comment: Option<&'a str>,
}

/// Records a user's rating of a visible product and refreshes the product's
/// `rating_average` / `rating_count`.
///
/// A user has at most one rating per product; rating again replaces the
/// earlier rate and comment. The product row is locked while the aggregate
/// is recomputed, so concurrent ratings cannot lose an update.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a rate outside 1-5 or an over-long
/// comment, [`DbError::NotFound`] if no visible product has the slug, or
/// [`DbError::Sqlx`] on failure.
pub async fn rate_product(
    pool: &PgPool,
    rating: &NewRating<'_>,
) -> Result<RatingSummary, DbError> {
    validate_rating(rating.rate, rating.comment)?;

    let mut tx = pool.begin().await?;

    let product_id: i64 = sqlx::query_scalar(
        "SELECT p.id FROM products p \
         JOIN vendors v ON v.id = p.vendor_id \
         WHERE p.slug = $1 AND p.deleted_at IS NULL AND p.is_active AND v.is_active \
         FOR UPDATE OF p",
    )
    .bind(rating.product_slug)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    sqlx::query(
        "INSERT INTO product_ratings (product_id, user_id, rate, comment) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (product_id, user_id) \
         DO UPDATE SET rate = EXCLUDED.rate, comment = EXCLUDED.comment, updated_at = NOW()",
    )
    .bind(product_id)
    .bind(rating.user_id)
    .bind(rating.rate)
    .bind(rating.comment)
    .execute(&mut *tx)
    .await?;

    let (rate_sum, rate_count): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(rate), 0)::BIGINT, COUNT(*) \
         FROM product_ratings WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_one(&mut *tx)
    .await?;

    let rating_average = rating_percent(rate_sum, rate_count);
    let rating_count = i32::try_from(rate_count).unwrap_or(i32::MAX);
    sqlx::query(
        "UPDATE products SET rating_average = $2, rating_count = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(product_id)
    .bind(rating_average)
    .bind(rating_count)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(product_id, rating_average, rating_count, "product rated");
    Ok(RatingSummary {
        product_id,
        rating_average,
        rating_count,
    })
}

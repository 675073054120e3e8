use std::collections::HashMap;

use bazaar_core::{slugify, CatalogSeed};
use sqlx::PgPool;

use crate::DbError;

/// Counts of rows written by [`apply_seed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub vendors: usize,
    pub products: usize,
}

/// Upsert a validated catalog seed: category tree, vendor accounts, and
/// their products.
///
/// All upserts run inside a single transaction; if any operation fails the
/// entire batch is rolled back. Re-running the same seed is idempotent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn apply_seed(pool: &PgPool, seed: &CatalogSeed) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();
    let mut category_ids: HashMap<String, i64> = HashMap::new();

    // Parents precede children in the flattened order.
    for (rank, node, parent_slug) in seed.flatten_categories() {
        let slug = node.slug();
        let parent_id = parent_slug
            .as_ref()
            .and_then(|parent| category_ids.get(parent).copied());

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (rank, name, slug, image_ref, parent_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (slug) DO UPDATE SET \
                 rank = EXCLUDED.rank, \
                 name = EXCLUDED.name, \
                 image_ref = EXCLUDED.image_ref, \
                 parent_id = EXCLUDED.parent_id, \
                 deleted_at = NULL, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(rank.level())
        .bind(&node.name)
        .bind(&slug)
        .bind(&node.image_ref)
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await?;

        category_ids.insert(slug, id);
        summary.categories += 1;
    }

    for vendor in &seed.vendors {
        let email = vendor.email.trim().to_lowercase();
        let vendor_slug = slugify(&vendor.display_name);

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, username, role, email_verified) \
             VALUES ($1, $2, 'vendor', true) \
             ON CONFLICT (email) DO UPDATE SET role = 'vendor', updated_at = NOW() \
             RETURNING id",
        )
        .bind(&email)
        .bind(&vendor_slug)
        .fetch_one(&mut *tx)
        .await?;

        let vendor_id: i64 = sqlx::query_scalar(
            "INSERT INTO vendors (user_id, display_name, slug, address, contact_email, phone) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 display_name = EXCLUDED.display_name, \
                 slug = EXCLUDED.slug, \
                 address = EXCLUDED.address, \
                 contact_email = EXCLUDED.contact_email, \
                 phone = EXCLUDED.phone \
             RETURNING id",
        )
        .bind(user_id)
        .bind(&vendor.display_name)
        .bind(&vendor_slug)
        .bind(&vendor.address)
        .bind(&email)
        .bind(&vendor.phone)
        .fetch_one(&mut *tx)
        .await?;
        summary.vendors += 1;

        for product in &vendor.products {
            // Seed paths are validated to walk the tree root-first.
            let mut refs = [None::<i64>; 4];
            for (slot, slug) in product.category_path.iter().enumerate().take(4) {
                refs[slot] = category_ids.get(slug).copied();
            }

            sqlx::query(
                "INSERT INTO products (vendor_id, name, slug, description, price, discount_price, \
                                       images, super_category_id, main_category_id, sub_category_id, \
                                       mini_category_id, in_stock, is_active, rating_average, rating_count) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                 ON CONFLICT (slug) DO UPDATE SET \
                     vendor_id = EXCLUDED.vendor_id, \
                     name = EXCLUDED.name, \
                     description = EXCLUDED.description, \
                     price = EXCLUDED.price, \
                     discount_price = EXCLUDED.discount_price, \
                     images = EXCLUDED.images, \
                     super_category_id = EXCLUDED.super_category_id, \
                     main_category_id = EXCLUDED.main_category_id, \
                     sub_category_id = EXCLUDED.sub_category_id, \
                     mini_category_id = EXCLUDED.mini_category_id, \
                     in_stock = EXCLUDED.in_stock, \
                     is_active = EXCLUDED.is_active, \
                     rating_average = EXCLUDED.rating_average, \
                     rating_count = EXCLUDED.rating_count, \
                     deleted_at = NULL, \
                     updated_at = NOW()",
            )
            .bind(vendor_id)
            .bind(&product.name)
            .bind(slugify(&product.name))
            .bind(&product.description)
            .bind(product.price)
            .bind(product.discount_price)
            .bind(&product.images)
            .bind(refs[0])
            .bind(refs[1])
            .bind(refs[2])
            .bind(refs[3])
            .bind(product.in_stock)
            .bind(product.is_active)
            .bind(product.rating_average)
            .bind(product.rating_count)
            .execute(&mut *tx)
            .await?;
            summary.products += 1;
        }
    }

    tx.commit().await?;
    tracing::info!(
        categories = summary.categories,
        vendors = summary.vendors,
        products = summary.products,
        "catalog seed applied"
    );
    Ok(summary)
}

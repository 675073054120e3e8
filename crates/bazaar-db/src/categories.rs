//! Database operations for the four-rank `categories` tree.

use bazaar_core::category::validate_parent;
use bazaar_core::{CategoryFilter, CategoryRank, CategoryRef};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CategoryRow {
    pub id: i64,
    pub rank: i16,
    pub name: String,
    pub slug: String,
    pub image_ref: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl CategoryRow {
    /// # Errors
    ///
    /// Returns [`DbError::Invalid`] if the stored rank is outside `1..=4`.
    pub fn category_rank(&self) -> Result<CategoryRank, DbError> {
        Ok(CategoryRank::from_level(self.rank)?)
    }
}

/// One breadcrumb step, root-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub id: i64,
    pub rank: CategoryRank,
    pub name: String,
    pub slug: String,
}

/// A category resolved from a route parameter, ready to filter products by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCategory {
    pub filter: CategoryFilter,
    pub name: String,
    pub slug: String,
    /// Root-first, ending with the category itself.
    pub breadcrumbs: Vec<Crumb>,
}

const CATEGORY_COLUMNS: &str = "id, rank, name, slug, image_ref, parent_id, created_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// All non-deleted categories of one rank, ordered by name then id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories_by_rank(
    pool: &PgPool,
    rank: CategoryRank,
) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories \
         WHERE rank = $1 AND deleted_at IS NULL \
         ORDER BY name, id"
    ))
    .bind(rank.level())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Children for a cascading select.
///
/// Supers have no parent, so `Super` lists every super category regardless
/// of `parent_id`. Any other rank without a parent yields an empty list.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_children(
    pool: &PgPool,
    child_rank: CategoryRank,
    parent_id: Option<i64>,
) -> Result<Vec<CategoryRow>, DbError> {
    if child_rank == CategoryRank::Super {
        return list_categories_by_rank(pool, child_rank).await;
    }
    let Some(parent_id) = parent_id else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories \
         WHERE rank = $1 AND parent_id = $2 AND deleted_at IS NULL \
         ORDER BY name, id"
    ))
    .bind(child_rank.level())
    .bind(parent_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch a non-deleted category by id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category(pool: &PgPool, id: i64) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

async fn find_by_ref(
    pool: &PgPool,
    rank: CategoryRank,
    reference: &CategoryRef,
) -> Result<Option<CategoryRow>, DbError> {
    let (id, slug) = match reference {
        CategoryRef::Id(id) => (Some(*id), None),
        CategoryRef::Slug(slug) => (None, Some(slug.as_str())),
    };

    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories \
         WHERE rank = $1 AND deleted_at IS NULL \
           AND id = COALESCE($2::BIGINT, id) \
           AND slug = COALESCE($3::TEXT, slug)"
    ))
    .bind(rank.level())
    .bind(id)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Walks `parent_id` up from `id` and returns the chain root-first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_chain(pool: &PgPool, id: i64) -> Result<Vec<CategoryRow>, DbError> {
    let mut rows = sqlx::query_as::<_, CategoryRow>(
        "WITH RECURSIVE chain AS ( \
             SELECT id, rank, name, slug, image_ref, parent_id, created_at \
             FROM categories WHERE id = $1 AND deleted_at IS NULL \
             UNION ALL \
             SELECT c.id, c.rank, c.name, c.slug, c.image_ref, c.parent_id, c.created_at \
             FROM categories c JOIN chain ON c.id = chain.parent_id \
             WHERE c.deleted_at IS NULL \
         ) \
         SELECT id, rank, name, slug, image_ref, parent_id, created_at FROM chain",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    rows.sort_by_key(|row| row.rank);
    Ok(rows)
}

/// Resolves a category route parameter at `rank` into a product filter plus
/// breadcrumbs.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown or soft-deleted category, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn resolve_category(
    pool: &PgPool,
    rank: CategoryRank,
    reference: &CategoryRef,
) -> Result<ResolvedCategory, DbError> {
    let row = find_by_ref(pool, rank, reference)
        .await?
        .ok_or(DbError::NotFound)?;

    let breadcrumbs = load_chain(pool, row.id)
        .await?
        .into_iter()
        .map(|c| {
            Ok(Crumb {
                id: c.id,
                rank: c.category_rank()?,
                name: c.name,
                slug: c.slug,
            })
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    Ok(ResolvedCategory {
        filter: CategoryFilter { rank, id: row.id },
        name: row.name,
        slug: row.slug,
        breadcrumbs,
    })
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a category after checking its parent sits one rank above it.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a broken chain, [`DbError::NotFound`] if
/// the parent does not exist, [`DbError::Conflict`] for a duplicate slug, or
/// [`DbError::Sqlx`] on other failures.
pub async fn create_category(
    pool: &PgPool,
    rank: CategoryRank,
    name: &str,
    slug: &str,
    image_ref: Option<&str>,
    parent_id: Option<i64>,
) -> Result<CategoryRow, DbError> {
    let parent_rank = match parent_id {
        Some(id) => Some(
            get_category(pool, id)
                .await?
                .ok_or(DbError::NotFound)?
                .category_rank()?,
        ),
        None => None,
    };
    validate_parent(rank, parent_rank)?;

    let result = sqlx::query_as::<_, CategoryRow>(&format!(
        "INSERT INTO categories (rank, name, slug, image_ref, parent_id) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(rank.level())
    .bind(name)
    .bind(slug)
    .bind(image_ref)
    .bind(parent_id)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(e) => {
            let err = DbError::from(e);
            if err.unique_violation().is_some() {
                Err(DbError::Conflict(format!(
                    "category slug '{slug}' already exists"
                )))
            } else {
                Err(err)
            }
        }
    }
}

/// Soft-delete a category.
///
/// Refused while any active, non-deleted product still references it at
/// its rank, or while it has non-deleted children.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the category is missing or already
/// deleted, [`DbError::Conflict`] if it is still referenced, or
/// [`DbError::Sqlx`] on failure.
pub async fn soft_delete_category(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let rank: Option<i16> = sqlx::query_scalar(
        "SELECT rank FROM categories WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    let rank = CategoryRank::from_level(rank.ok_or(DbError::NotFound)?)?;

    // Column name comes from a closed enum, never from input.
    let column = rank.product_column();
    let referenced: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM products \
         WHERE {column} = $1 AND is_active = true AND deleted_at IS NULL)"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if referenced {
        return Err(DbError::Conflict(
            "category is referenced by active products".to_string(),
        ));
    }

    let has_children: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM categories WHERE parent_id = $1 AND deleted_at IS NULL)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if has_children {
        return Err(DbError::Conflict("category has child categories".to_string()));
    }

    sqlx::query("UPDATE categories SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

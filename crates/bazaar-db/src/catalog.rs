//! Product listing queries shared by the shop grid, vendor storefronts, and
//! the vendor dashboard.

use bazaar_core::{
    discount_percent, CategoryFilter, CategoryRank, Direction, NormalizedQuery, OrderField, Page,
    ProductCard,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which products a listing may show. Soft-deleted products are never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Customer-facing: active products of active vendors.
    #[default]
    Storefront,
    /// Vendor dashboard, no status filter.
    All,
    ActiveOnly,
    InactiveOnly,
}

impl Visibility {
    fn as_param(self) -> &'static str {
        match self {
            Visibility::Storefront => "storefront",
            Visibility::All => "all",
            Visibility::ActiveOnly => "active",
            Visibility::InactiveOnly => "inactive",
        }
    }

    /// Parses a dashboard `status` parameter; anything unrecognized means all.
    #[must_use]
    pub fn from_status(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some("active") => Visibility::ActiveOnly,
            Some("inactive") => Visibility::InactiveOnly,
            _ => Visibility::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductScope {
    pub category: Option<CategoryFilter>,
    pub vendor_id: Option<i64>,
    pub visibility: Visibility,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
}

impl ProductScope {
    #[must_use]
    pub fn storefront(category: Option<CategoryFilter>) -> Self {
        Self {
            category,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn vendor_storefront(vendor_id: i64) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn vendor_dashboard(vendor_id: i64, visibility: Visibility) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            visibility,
            ..Self::default()
        }
    }

    /// Narrows the scope to names containing `term`. Blank terms are ignored.
    #[must_use]
    pub fn with_search(mut self, term: Option<&str>) -> Self {
        self.search = term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    /// `ILIKE` pattern for the search term with `%`, `_` and `\` escaped.
    fn search_pattern(&self) -> Option<String> {
        self.search.as_deref().map(|term| {
            let mut pattern = String::with_capacity(term.len() + 2);
            pattern.push('%');
            for c in term.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }

    /// One bind slot per rank column; only the filtered rank is set.
    fn category_binds(&self) -> [Option<i64>; 4] {
        let mut binds = [None; 4];
        if let Some(filter) = self.category {
            let slot = match filter.rank {
                CategoryRank::Super => 0,
                CategoryRank::Main => 1,
                CategoryRank::Sub => 2,
                CategoryRank::Mini => 3,
            };
            binds[slot] = Some(filter.id);
        }
        binds
    }
}

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A product joined with its vendor, as read for any product grid.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductCardRow {
    pub id: i64,
    pub vendor_id: i64,
    pub name: String,
    pub slug: String,
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
    pub vendor_name: String,
    pub vendor_slug: String,
    pub created_at: DateTime<Utc>,
}

impl From<ProductCardRow> for ProductCard {
    fn from(row: ProductCardRow) -> Self {
        ProductCard {
            id: row.id,
            discount_percent: discount_percent(row.price, row.discount_price),
            primary_image: row.images.first().cloned(),
            name: row.name,
            slug: row.slug,
            price: row.price,
            discount_price: row.discount_price,
            images: row.images,
            in_stock: row.in_stock,
            is_active: row.is_active,
            rating_average: row.rating_average,
            rating_count: row.rating_count,
            vendor_name: row.vendor_name,
            vendor_slug: row.vendor_slug,
            created_at: row.created_at,
        }
    }
}

const CARD_SELECT: &str = "SELECT p.id, p.vendor_id, p.name, p.slug, p.description, p.price, \
            p.discount_price, p.images, p.super_category_id, p.main_category_id, \
            p.sub_category_id, p.mini_category_id, p.in_stock, p.is_active, \
            p.rating_average, p.rating_count, v.display_name AS vendor_name, \
            v.slug AS vendor_slug, p.created_at \
     FROM products p \
     JOIN vendors v ON v.id = p.vendor_id";

// $1..$4 category columns, $5 vendor, $6 visibility, $7 name pattern.
const SCOPE_WHERE: &str = "WHERE p.deleted_at IS NULL \
       AND ($1::BIGINT IS NULL OR p.super_category_id = $1) \
       AND ($2::BIGINT IS NULL OR p.main_category_id = $2) \
       AND ($3::BIGINT IS NULL OR p.sub_category_id = $3) \
       AND ($4::BIGINT IS NULL OR p.mini_category_id = $4) \
       AND ($5::BIGINT IS NULL OR p.vendor_id = $5) \
       AND ($6::TEXT <> 'storefront' OR (p.is_active AND v.is_active)) \
       AND ($6::TEXT <> 'active' OR p.is_active) \
       AND ($6::TEXT <> 'inactive' OR NOT p.is_active) \
       AND ($7::TEXT IS NULL OR p.name ILIKE $7)";

/// `ORDER BY` body for a sort, always ending in the `id ASC` tie-break.
fn order_clause(field: OrderField, direction: Direction) -> &'static str {
    match (field, direction) {
        (OrderField::Id, Direction::Asc) => "p.id ASC",
        (OrderField::Id, Direction::Desc) => "p.id DESC",
        (OrderField::CreatedAt, Direction::Asc) => "p.created_at ASC, p.id ASC",
        (OrderField::CreatedAt, Direction::Desc) => "p.created_at DESC, p.id ASC",
        (OrderField::EffectivePrice, Direction::Asc) => {
            "COALESCE(p.discount_price, p.price) ASC, p.id ASC"
        }
        (OrderField::EffectivePrice, Direction::Desc) => {
            "COALESCE(p.discount_price, p.price) DESC, p.id ASC"
        }
        (OrderField::Rating, Direction::Asc) => "p.rating_average ASC, p.id ASC",
        (OrderField::Rating, Direction::Desc) => "p.rating_average DESC, p.id ASC",
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// One ordered window of products in scope.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_products(
    pool: &PgPool,
    scope: &ProductScope,
    order: (OrderField, Direction),
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductCardRow>, DbError> {
    let [super_id, main_id, sub_id, mini_id] = scope.category_binds();
    let sql = format!(
        "{CARD_SELECT} {SCOPE_WHERE} ORDER BY {} LIMIT $8 OFFSET $9",
        order_clause(order.0, order.1)
    );

    let rows = sqlx::query_as::<_, ProductCardRow>(&sql)
        .bind(super_id)
        .bind(main_id)
        .bind(sub_id)
        .bind(mini_id)
        .bind(scope.vendor_id)
        .bind(scope.visibility.as_param())
        .bind(scope.search_pattern())
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Number of products in scope, ignoring any window.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(pool: &PgPool, scope: &ProductScope) -> Result<i64, DbError> {
    let [super_id, main_id, sub_id, mini_id] = scope.category_binds();
    let sql = format!(
        "SELECT COUNT(*) FROM products p JOIN vendors v ON v.id = p.vendor_id {SCOPE_WHERE}"
    );

    let total: i64 = sqlx::query_scalar(&sql)
        .bind(super_id)
        .bind(main_id)
        .bind(sub_id)
        .bind(mini_id)
        .bind(scope.vendor_id)
        .bind(scope.visibility.as_param())
        .bind(scope.search_pattern())
        .fetch_one(pool)
        .await?;

    Ok(total)
}

/// Fetches the cumulative window `[0, page_size)` for a normalized query.
///
/// A category that does not exist simply matches nothing, so the result is
/// an exhausted empty page rather than an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn fetch_page(
    pool: &PgPool,
    query: &NormalizedQuery,
    scope: &ProductScope,
) -> Result<Page<ProductCard>, DbError> {
    let scope = ProductScope {
        category: query.category_filter.or(scope.category),
        ..scope.clone()
    };

    let total = count_products(pool, &scope).await?;
    if total == 0 {
        return Ok(Page::empty());
    }

    let rows = find_products(
        pool,
        &scope,
        (query.order_field, query.direction),
        query.page_size,
        0,
    )
    .await?;

    tracing::debug!(
        sort = %query.sort,
        page_size = query.page_size,
        returned = rows.len(),
        total,
        "catalog window fetched"
    );

    let items = rows.into_iter().map(ProductCard::from).collect();
    Ok(Page::from_window(items, query.page_size, total))
}

/// Flat product list in insertion order, for simple consumers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductCard>, DbError> {
    let rows = find_products(
        pool,
        &ProductScope::default(),
        (OrderField::Id, Direction::Asc),
        limit,
        offset,
    )
    .await?;
    Ok(rows.into_iter().map(ProductCard::from).collect())
}

/// Fetch one visible product by slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no active, non-deleted product of an
/// active vendor has this slug, or [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<ProductCardRow, DbError> {
    let row = sqlx::query_as::<_, ProductCardRow>(&format!(
        "{CARD_SELECT} \
         WHERE p.slug = $1 AND p.deleted_at IS NULL AND p.is_active AND v.is_active"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_order_clause_ends_with_id_tie_break() {
        let fields = [
            OrderField::Id,
            OrderField::CreatedAt,
            OrderField::EffectivePrice,
            OrderField::Rating,
        ];
        for field in fields {
            for direction in [Direction::Asc, Direction::Desc] {
                let clause = order_clause(field, direction);
                assert!(
                    clause.ends_with("p.id ASC") || clause == "p.id DESC",
                    "{clause}"
                );
            }
        }
    }

    #[test]
    fn effective_price_prefers_discount() {
        assert!(order_clause(OrderField::EffectivePrice, Direction::Asc)
            .starts_with("COALESCE(p.discount_price, p.price)"));
    }

    #[test]
    fn category_binds_fill_only_the_filtered_rank() {
        let scope = ProductScope::storefront(Some(CategoryFilter {
            rank: CategoryRank::Sub,
            id: 9,
        }));
        assert_eq!(scope.category_binds(), [None, None, Some(9), None]);
        assert_eq!(ProductScope::default().category_binds(), [None; 4]);
    }

    #[test]
    fn search_pattern_escapes_like_wildcards() {
        let scope = ProductScope::storefront(None).with_search(Some("  50%_off\\ "));
        assert_eq!(scope.search.as_deref(), Some("50%_off\\"));
        assert_eq!(
            scope.search_pattern().as_deref(),
            Some("%50\\%\\_off\\\\%")
        );

        assert_eq!(ProductScope::default().with_search(Some("   ")).search, None);
        assert_eq!(ProductScope::default().search_pattern(), None);
    }

    #[test]
    fn dashboard_status_parses_with_all_fallback() {
        assert_eq!(Visibility::from_status(Some("active")), Visibility::ActiveOnly);
        assert_eq!(
            Visibility::from_status(Some("inactive")),
            Visibility::InactiveOnly
        );
        assert_eq!(Visibility::from_status(Some("bogus")), Visibility::All);
        assert_eq!(Visibility::from_status(None), Visibility::All);
    }
}

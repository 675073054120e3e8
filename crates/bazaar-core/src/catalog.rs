//! Sort/filter normalization and the page contract shared by every listing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::CategoryFilter;

/// Largest window any listing endpoint serves. Reveal clients stop growing
/// their window here, so a cumulative listing shows at most this many rows.
pub const MAX_PAGE_SIZE: i64 = 1_000;

/// User-facing sort choices for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Featured,
    Newest,
    PriceLow,
    PriceHigh,
    Rating,
}

impl SortKey {
    /// Parses a sort key, falling back to [`SortKey::Featured`] for anything
    /// unrecognized.
    ///
    /// Besides the canonical names this accepts `price-asc`/`price-desc` and
    /// the `order_by` values the legacy shop pages sent.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "newest" | "-date" | "-created_at" => SortKey::Newest,
            "price-low" | "price-asc" | "PRDPrice" => SortKey::PriceLow,
            "price-high" | "price-desc" | "-PRDPrice" => SortKey::PriceHigh,
            "rating" | "-feedbak_average" => SortKey::Rating,
            _ => SortKey::Featured,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Featured => "featured",
            SortKey::Newest => "newest",
            SortKey::PriceLow => "price-low",
            SortKey::PriceHigh => "price-high",
            SortKey::Rating => "rating",
        }
    }

    #[must_use]
    pub fn order(self) -> (OrderField, Direction) {
        match self {
            SortKey::Featured => (OrderField::Id, Direction::Asc),
            SortKey::Newest => (OrderField::CreatedAt, Direction::Desc),
            SortKey::PriceLow => (OrderField::EffectivePrice, Direction::Asc),
            SortKey::PriceHigh => (OrderField::EffectivePrice, Direction::Desc),
            SortKey::Rating => (OrderField::Rating, Direction::Desc),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    /// Insertion order.
    Id,
    CreatedAt,
    /// `discount_price` when present, otherwise `price`.
    EffectivePrice,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Fully normalized listing query consumed by the catalog query service.
///
/// Ties within `order_field` are always broken by `id ASC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedQuery {
    pub sort: SortKey,
    pub order_field: OrderField,
    pub direction: Direction,
    pub category_filter: Option<CategoryFilter>,
    pub page_size: i64,
}

/// Builds the one query shape every product listing uses.
#[must_use]
pub fn normalize(
    sort_key: Option<&str>,
    category_filter: Option<CategoryFilter>,
    page_size: Option<i64>,
    default_page_size: i64,
) -> NormalizedQuery {
    let sort = sort_key.map_or(SortKey::Featured, SortKey::parse);
    let (order_field, direction) = sort.order();
    NormalizedQuery {
        sort,
        order_field,
        direction,
        category_filter,
        page_size: clamp_page_size(page_size, default_page_size),
    }
}

#[must_use]
pub fn clamp_page_size(page_size: Option<i64>, default_page_size: i64) -> i64 {
    page_size.unwrap_or(default_page_size).clamp(1, MAX_PAGE_SIZE)
}

/// A window is exhausted when it came back short or already covers every match.
#[must_use]
pub fn is_exhausted(returned: usize, page_size: i64, total_matched: i64) -> bool {
    let returned = i64::try_from(returned).unwrap_or(i64::MAX);
    returned < page_size || page_size >= total_matched
}

/// Unified listing response: `{items, total_matched, exhausted}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_matched: i64,
    pub exhausted: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn from_window(items: Vec<T>, page_size: i64, total_matched: i64) -> Self {
        let exhausted = is_exhausted(items.len(), page_size, total_matched);
        Self {
            items,
            total_matched,
            exhausted,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_matched: 0,
            exhausted: true,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_matched: self.total_matched,
            exhausted: self.exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryRank;

    #[test]
    fn sort_key_parses_canonical_and_alias_names() {
        assert_eq!(SortKey::parse("price-low"), SortKey::PriceLow);
        assert_eq!(SortKey::parse("price-asc"), SortKey::PriceLow);
        assert_eq!(SortKey::parse("-PRDPrice"), SortKey::PriceHigh);
        assert_eq!(SortKey::parse("newest"), SortKey::Newest);
        assert_eq!(SortKey::parse("-feedbak_average"), SortKey::Rating);
    }

    #[test]
    fn unknown_sort_key_falls_back_to_featured() {
        assert_eq!(SortKey::parse("cheapest-first"), SortKey::Featured);
        assert_eq!(SortKey::parse(""), SortKey::Featured);
    }

    #[test]
    fn normalize_maps_sort_to_order_field() {
        let filter = CategoryFilter {
            rank: CategoryRank::Super,
            id: 7,
        };
        let q = normalize(Some("price-high"), Some(filter), Some(20), 10);
        assert_eq!(q.order_field, OrderField::EffectivePrice);
        assert_eq!(q.direction, Direction::Desc);
        assert_eq!(q.category_filter, Some(filter));
        assert_eq!(q.page_size, 20);

        let q = normalize(None, None, None, 12);
        assert_eq!(q.sort, SortKey::Featured);
        assert_eq!(q.order_field, OrderField::Id);
        assert_eq!(q.direction, Direction::Asc);
        assert_eq!(q.page_size, 12);
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(clamp_page_size(Some(0), 10), 1);
        assert_eq!(clamp_page_size(Some(-5), 10), 1);
        assert_eq!(clamp_page_size(Some(10_000), 10), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(None, 10), 10);
    }

    #[test]
    fn exhaustion_follows_window_rule() {
        // 23 matches, windows of 10/20/30
        assert!(!is_exhausted(10, 10, 23));
        assert!(!is_exhausted(20, 20, 23));
        assert!(is_exhausted(23, 30, 23));
        // window exactly covering the matches is exhausted
        assert!(is_exhausted(20, 20, 20));
        // short page even when the count disagrees
        assert!(is_exhausted(3, 10, 50));
        assert!(is_exhausted(0, 10, 0));
    }

    #[test]
    fn page_serializes_unified_shape() {
        let page = Page::from_window(vec![1, 2], 10, 2);
        let json = serde_json::to_value(&page).expect("serialize");
        assert_eq!(json["total_matched"], 2);
        assert_eq!(json["exhausted"], true);
        assert_eq!(json["items"].as_array().map(Vec::len), Some(2));
    }
}

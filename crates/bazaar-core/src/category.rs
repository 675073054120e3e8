//! The four-rank product taxonomy: Super → Main → Sub → Mini.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryRank {
    Super,
    Main,
    Sub,
    Mini,
}

impl CategoryRank {
    pub const ALL: [CategoryRank; 4] = [
        CategoryRank::Super,
        CategoryRank::Main,
        CategoryRank::Sub,
        CategoryRank::Mini,
    ];

    /// Storage value (`categories.rank`), 1 for Super through 4 for Mini.
    #[must_use]
    pub fn level(self) -> i16 {
        match self {
            CategoryRank::Super => 1,
            CategoryRank::Main => 2,
            CategoryRank::Sub => 3,
            CategoryRank::Mini => 4,
        }
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRank`] for anything outside `1..=4`.
    pub fn from_level(level: i16) -> Result<Self, CoreError> {
        match level {
            1 => Ok(CategoryRank::Super),
            2 => Ok(CategoryRank::Main),
            3 => Ok(CategoryRank::Sub),
            4 => Ok(CategoryRank::Mini),
            other => Err(CoreError::InvalidRank(other.to_string())),
        }
    }

    /// The rank a category of this rank must have as its parent.
    #[must_use]
    pub fn parent(self) -> Option<CategoryRank> {
        match self {
            CategoryRank::Super => None,
            CategoryRank::Main => Some(CategoryRank::Super),
            CategoryRank::Sub => Some(CategoryRank::Main),
            CategoryRank::Mini => Some(CategoryRank::Sub),
        }
    }

    #[must_use]
    pub fn child(self) -> Option<CategoryRank> {
        match self {
            CategoryRank::Super => Some(CategoryRank::Main),
            CategoryRank::Main => Some(CategoryRank::Sub),
            CategoryRank::Sub => Some(CategoryRank::Mini),
            CategoryRank::Mini => None,
        }
    }

    /// Product column holding the reference for this rank.
    #[must_use]
    pub fn product_column(self) -> &'static str {
        match self {
            CategoryRank::Super => "super_category_id",
            CategoryRank::Main => "main_category_id",
            CategoryRank::Sub => "sub_category_id",
            CategoryRank::Mini => "mini_category_id",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryRank::Super => "super",
            CategoryRank::Main => "main",
            CategoryRank::Sub => "sub",
            CategoryRank::Mini => "mini",
        }
    }
}

impl fmt::Display for CategoryRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryRank {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super" | "1" => Ok(CategoryRank::Super),
            "main" | "2" => Ok(CategoryRank::Main),
            "sub" | "3" => Ok(CategoryRank::Sub),
            "mini" | "4" => Ok(CategoryRank::Mini),
            other => Err(CoreError::InvalidRank(other.to_string())),
        }
    }
}

/// The effective predicate a product listing is filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub rank: CategoryRank,
    pub id: i64,
}

/// A category addressed either by numeric id or by slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Id(i64),
    Slug(String),
}

impl CategoryRef {
    /// Numeric path segments are ids; anything else is a slug.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => CategoryRef::Id(id),
            Err(_) => CategoryRef::Slug(raw.trim().to_string()),
        }
    }
}

/// Checks that a category of `rank` may hang under a parent of `parent_rank`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCategoryChain`] when a Super has a parent, a
/// non-Super has none, or the parent sits at the wrong rank.
pub fn validate_parent(
    rank: CategoryRank,
    parent_rank: Option<CategoryRank>,
) -> Result<(), CoreError> {
    match (rank.parent(), parent_rank) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(CoreError::InvalidCategoryChain(
            "a super category cannot have a parent".to_string(),
        )),
        (Some(expected), None) => Err(CoreError::InvalidCategoryChain(format!(
            "a {rank} category requires a {expected} parent"
        ))),
        (Some(expected), Some(actual)) if expected == actual => Ok(()),
        (Some(expected), Some(actual)) => Err(CoreError::InvalidCategoryChain(format!(
            "a {rank} category requires a {expected} parent, got {actual}"
        ))),
    }
}

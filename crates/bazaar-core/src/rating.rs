//! Star ratings and the percentage aggregate stored on products.

use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const MIN_RATE: i16 = 1;
pub const MAX_RATE: i16 = 5;
pub const MAX_RATING_COMMENT_LEN: usize = 100;

/// Product rating aggregate returned after a rating is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub product_id: i64,
    pub rating_average: i16,
    pub rating_count: i32,
}

/// # Errors
///
/// Returns [`CoreError::Validation`] if `rate` is outside 1-5 or the comment
/// is longer than 100 characters.
pub fn validate_rating(rate: i16, comment: Option<&str>) -> Result<(), CoreError> {
    if !(MIN_RATE..=MAX_RATE).contains(&rate) {
        return Err(CoreError::InvalidInput(format!(
            "rate must be between {MIN_RATE} and {MAX_RATE}"
        )));
    }
    if comment.is_some_and(|c| c.chars().count() > MAX_RATING_COMMENT_LEN) {
        return Err(CoreError::InvalidInput(format!(
            "comment must be at most {MAX_RATING_COMMENT_LEN} characters"
        )));
    }
    Ok(())
}

/// Average star rating as a 0-100 percentage, rounded half up.
///
/// One star is 20, five stars is 100; no ratings is 0.
#[must_use]
pub fn rating_percent(rate_sum: i64, rate_count: i64) -> i16 {
    if rate_count <= 0 {
        return 0;
    }
    let percent = (rate_sum * 40 + rate_count) / (2 * rate_count);
    i16::try_from(percent.clamp(0, 100)).unwrap_or(100)
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::CoreError;

/// Percentage saved by the discount, rounded half away from zero.
///
/// Always within `0..=100`; a missing discount, a non-positive price, or a
/// discount that is not below the price yields 0.
#[must_use]
pub fn discount_percent(price: Decimal, discount_price: Option<Decimal>) -> u8 {
    let Some(discount) = discount_price else {
        return 0;
    };
    if price <= Decimal::ZERO || discount >= price {
        return 0;
    }

    let pct = ((price - discount) / price * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    pct.to_u8().unwrap_or(0)
}

/// Write-time integrity check for a product's price pair.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPricing`] when the price is negative or the
/// discount price is negative or not strictly below the price.
pub fn validate_pricing(price: Decimal, discount_price: Option<Decimal>) -> Result<(), CoreError> {
    if price < Decimal::ZERO {
        return Err(CoreError::InvalidPricing(
            "price must not be negative".to_string(),
        ));
    }
    if let Some(discount) = discount_price {
        if discount < Decimal::ZERO {
            return Err(CoreError::InvalidPricing(
                "discount_price must not be negative".to_string(),
            ));
        }
        if discount >= price {
            return Err(CoreError::InvalidPricing(format!(
                "discount_price {discount} must be less than price {price}"
            )));
        }
    }
    Ok(())
}

//! Decimal helpers shared by every money and quantity computation.
//!
//! Amounts and quantities are `rust_decimal::Decimal` throughout; floats never
//! enter a balance.

use rust_decimal::RoundingStrategy;

use crate::error::{DomainError, DomainResult};

pub use rust_decimal::Decimal;

/// Number of fractional digits kept for currency amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Round an amount to currency precision (half away from zero).
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Validation helper: `value` must be strictly positive.
pub fn ensure_positive(value: Decimal, what: &str) -> DomainResult<()> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!("{what} must be positive")));
    }
    Ok(())
}

/// Validation helper: `value` must not be negative.
pub fn ensure_non_negative(value: Decimal, what: &str) -> DomainResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(format!("{what} cannot be negative")));
    }
    Ok(())
}

/// `quantity * unit_price` rounded to currency precision, or a validation
/// error when the product does not fit in a `Decimal`.
pub fn checked_line_total(quantity: Decimal, unit_price: Decimal) -> DomainResult<Decimal> {
    quantity
        .checked_mul(unit_price)
        .map(round_currency)
        .ok_or_else(|| DomainError::validation("line total is out of range"))
}

/// Sum `values`, failing with a validation error naming `what` on overflow.
pub fn checked_sum<I>(values: I, what: &str) -> DomainResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| DomainError::validation(format!("{what} is out of range")))
    })
}

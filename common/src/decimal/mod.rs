//! Decimal type utilities for exact money arithmetic

pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

use crate::error::{Error, Result};

/// Monetary amount (balances, deposits, debits, fees)
pub type Amount = Decimal;

/// Percentage rate (interest, deposit bonus)
pub type Rate = Decimal;

fn overflow(operation: &str, lhs: Decimal, rhs: Decimal) -> Error {
    Error::DecimalError(format!("{} of {} and {} overflows", operation, lhs, rhs))
}

/// `lhs + rhs`, failing instead of overflowing
pub fn checked_add(lhs: Amount, rhs: Amount) -> Result<Amount> {
    lhs.checked_add(rhs).ok_or_else(|| overflow("Addition", lhs, rhs))
}

/// `lhs * rhs`, failing instead of overflowing
pub fn checked_mul(lhs: Decimal, rhs: Decimal) -> Result<Decimal> {
    lhs.checked_mul(rhs).ok_or_else(|| overflow("Multiplication", lhs, rhs))
}

fn checked_div(lhs: Decimal, rhs: Decimal) -> Result<Decimal> {
    lhs.checked_div(rhs).ok_or_else(|| overflow("Division", lhs, rhs))
}

/// `rate` percent of `base`
pub fn percentage(base: Amount, rate: Rate) -> Result<Amount> {
    checked_div(checked_mul(base, rate)?, dec!(100))
}

/// Scale `amount` up by `rate` percent, i.e. `amount * (1 + rate / 100)`
pub fn scale_by_rate(amount: Amount, rate: Rate) -> Result<Amount> {
    let factor = checked_add(Decimal::ONE, checked_div(rate, dec!(100))?)?;
    checked_mul(amount, factor)
}

/// Precision helpers for common operations
pub mod precision {
    use super::*;

    /// Display precision for money (2 decimal places)
    pub const MONEY_PRECISION: u32 = 2;

    /// Round an amount to display precision
    pub fn round_money(amount: Amount) -> Amount {
        amount.round_dp(MONEY_PRECISION)
    }
}

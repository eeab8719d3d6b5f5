//! Decimal arithmetic utilities for prices, sizes, and statistics.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// One US cent, the granularity of budget amounts.
pub const CENT: Decimal = dec!(0.01);

/// Round down to lot size (quantity precision).
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Round a USD amount down to whole cents. Never rounds up.
pub fn floor_cents(value: Decimal) -> Decimal {
    round_down_to_lot(value, CENT)
}

/// Arithmetic mean, `None` for an empty sample.
pub fn mean<'a, I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a Decimal>,
{
    let (sum, count) = values
        .into_iter()
        .fold((Decimal::ZERO, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / Decimal::from(count))
    }
}

/// Sample standard deviation (n - 1), `None` with fewer than two values.
pub fn sample_std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let squares: Decimal = values.iter().map(|v| (v - avg) * (v - avg)).sum();
    let variance = squares / Decimal::from(values.len() - 1);
    variance.sqrt()
}

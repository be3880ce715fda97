//! Indicators used by the SAR strategy.
//!
//! The Parabolic SAR engine is the only stateful recurrence in the crate and
//! the single source of SAR values for every caller. ATR backs the
//! volatility entry filter.

pub mod atr;
pub mod parabolic_sar;

pub use atr::Atr;
pub use parabolic_sar::{
    compute, compute_with_states, ParabolicSar, SarError, SarParams, SarPoint, SarRecurrence,
    SarSeries, SarState, Trend,
};

use crate::domain::PriceBar;

/// Trait for indicators that reduce a bar history to one numeric series.
///
/// The output has the same length as `bars`. Positions that cannot be
/// computed (warmup, or the whole series on invalid input) are `f64::NAN`.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "psar_0.02_0.02_0.2", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    fn values(&self, bars: &[PriceBar]) -> Vec<f64>;
}

/// Synthetic 15-minute bars from close prices, for tests.
///
/// open = prev_close (or close for the first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar::new(
                bar_time(i),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            )
            .with_volume(1000.0)
        })
        .collect()
}

/// Synthetic bars from `(high, low)` pairs; open and close sit at the midpoint.
#[cfg(test)]
pub fn make_hl_bars(pairs: &[(f64, f64)]) -> Vec<PriceBar> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, &(high, low))| {
            let mid = (high + low) / 2.0;
            PriceBar::new(bar_time(i), mid, high, low, mid)
        })
        .collect()
}

#[cfg(test)]
fn bar_time(i: usize) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        + chrono::Duration::minutes(15 * i as i64)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

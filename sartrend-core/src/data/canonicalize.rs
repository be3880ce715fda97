//! Sort, dedupe and sanity-check candle series before they reach the engine.

use super::DataError;
use crate::domain::PriceBar;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What `canonicalize` had to repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalReport {
    /// Input was not already in timestamp order.
    pub reordered: bool,
    pub duplicates_dropped: usize,
}

impl CanonicalReport {
    pub fn is_clean(&self) -> bool {
        !self.reordered && self.duplicates_dropped == 0
    }
}

/// Stable-sort by timestamp and drop repeated timestamps, keeping the first.
pub fn canonicalize(mut bars: Vec<PriceBar>) -> (Vec<PriceBar>, CanonicalReport) {
    let reordered = bars.windows(2).any(|w| w[1].timestamp < w[0].timestamp);
    if reordered {
        bars.sort_by_key(|b| b.timestamp);
    }
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);

    let report = CanonicalReport {
        reordered,
        duplicates_dropped: before - bars.len(),
    };
    if !report.is_clean() {
        warn!(
            reordered = report.reordered,
            duplicates = report.duplicates_dropped,
            "repaired candle series"
        );
    }
    (bars, report)
}

/// First bar failing [`PriceBar::is_sane`], as an error.
pub fn validate_bars(bars: &[PriceBar]) -> Result<(), DataError> {
    match bars.iter().position(|b| !b.is_sane()) {
        None => Ok(()),
        Some(index) => {
            let b = &bars[index];
            Err(DataError::InvalidBar {
                index,
                reason: format!(
                    "o={} h={} l={} c={} v={:?} at {}",
                    b.open, b.high, b.low, b.close, b.volume, b.timestamp
                ),
            })
        }
    }
}

/// True if timestamps strictly increase.
pub fn is_canonical(bars: &[PriceBar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

//! Signal classifier: (price, SAR, trend) → Buy / Sell / Hold.

use crate::domain::PriceBar;
use crate::indicators::{SarSeries, Trend};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisory signal for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
        })
    }
}

/// Rising with price above SAR is Buy, Falling with price below SAR is Sell,
/// everything else (including NaN inputs) is Hold.
pub fn classify(price: f64, sar_value: f64, trend: Trend) -> Signal {
    match trend {
        Trend::Rising if price > sar_value => Signal::Buy,
        Trend::Falling if price < sar_value => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// Classify the last bar's close against the last SAR point.
///
/// Hold when either input is empty.
pub fn classify_latest(bars: &[PriceBar], series: &SarSeries) -> Signal {
    match (bars.last(), series.last()) {
        (Some(bar), Some(point)) => classify(bar.close, point.value, point.trend),
        _ => Signal::Hold,
    }
}

//! Market-data provider trait and structured error types.
//!
//! The provider abstracts over candle sources (exchange REST, CSV files) so
//! the runner and CLI can swap implementations and mock for tests.

use crate::domain::{Interval, PriceBar};
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {instrument} at {interval}")]
    NotFound {
        instrument: String,
        interval: Interval,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at record {record}: {message}")]
    Parse { record: usize, message: String },

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("cannot resample {from} into {to}: {reason}")]
    Resample {
        from: Interval,
        to: Interval,
        reason: String,
    },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of chronological candles for a named instrument and interval.
///
/// Implementations return at most `limit` of the most recent bars, oldest
/// first, without duplicate timestamps.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        instrument: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<PriceBar>, DataError>;
}

/// In-memory provider over a fixed set of series.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    series: Vec<(String, Interval, Vec<PriceBar>)>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, instrument: &str, interval: Interval, bars: Vec<PriceBar>) -> Self {
        self.series.push((instrument.to_string(), interval, bars));
        self
    }
}

impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(
        &self,
        instrument: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<PriceBar>, DataError> {
        let bars = self
            .series
            .iter()
            .find(|(name, iv, _)| name == instrument && *iv == interval)
            .map(|(_, _, bars)| bars)
            .ok_or_else(|| DataError::NotFound {
                instrument: instrument.to_string(),
                interval,
            })?;
        Ok(tail(bars, limit).to_vec())
    }
}

/// The last `limit` elements of `bars`.
pub fn tail(bars: &[PriceBar], limit: usize) -> &[PriceBar] {
    &bars[bars.len().saturating_sub(limit)..]
}

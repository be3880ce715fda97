//! Candle loading for the runner and CLI.
//!
//! Reads CSV files with a `timestamp,open,high,low,close[,volume]` header.
//! Timestamps are either epoch milliseconds or RFC 3339. Loaded series are
//! canonicalized (sorted, duplicate timestamps dropped) and then validated;
//! a single malformed bar fails the whole load.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sartrend_core::data::{canonicalize, tail, validate_bars, DataError, MarketDataProvider};
use sartrend_core::domain::{Interval, PriceBar};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} contains no bars")]
    Empty { path: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Load, canonicalize and validate one candle file.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceBar>, LoadError> {
    let path = path.as_ref();
    let csv_err = |source| LoadError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut bars = Vec::new();
    for (record, row) in reader.deserialize::<CsvRecord>().enumerate() {
        let row = row.map_err(csv_err)?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| DataError::Parse {
            record,
            message: format!("unrecognized timestamp '{}'", row.timestamp),
        })?;
        let bar = PriceBar::new(timestamp, row.open, row.high, row.low, row.close);
        bars.push(match row.volume {
            Some(v) => bar.with_volume(v),
            None => bar,
        });
    }

    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.display().to_string(),
        });
    }

    let (bars, report) = canonicalize(bars);
    validate_bars(&bars)?;
    debug!(
        path = %path.display(),
        bars = bars.len(),
        duplicates = report.duplicates_dropped,
        "loaded candles"
    );
    Ok(bars)
}

/// Epoch milliseconds or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Deterministic BLAKE3 hash over all bar data.
pub fn dataset_hash(bars: &[PriceBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.unwrap_or(f64::NAN).to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Provider over a directory of `{instrument}_{interval}.csv` files.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, instrument: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{instrument}_{}.csv", interval.label()))
    }
}

impl MarketDataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        instrument: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path_for(instrument, interval);
        if !path.exists() {
            return Err(DataError::NotFound {
                instrument: instrument.to_string(),
                interval,
            });
        }
        let bars = load_csv(&path).map_err(|err| match err {
            LoadError::Data(inner) => inner,
            other => DataError::Unavailable(other.to_string()),
        })?;
        Ok(tail(&bars, limit).to_vec())
    }
}

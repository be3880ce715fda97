//! Candle providers, canonicalization and resampling.

pub mod canonicalize;
pub mod provider;
pub mod resample;

pub use canonicalize::{canonicalize, is_canonical, validate_bars, CanonicalReport};
pub use provider::{tail, DataError, MarketDataProvider, StaticProvider};
pub use resample::{completed_by, resample};

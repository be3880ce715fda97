//! SarTrend Core — Parabolic SAR engine, signal classifier, position state,
//! strategy layer and candle plumbing.
//!
//! This crate has no I/O of its own:
//! - Domain types (bars, intervals, positions, trades)
//! - The single SAR recurrence and its series output
//! - Buy/Sell/Hold classification
//! - A position-aware strategy with confirmation and entry filters
//! - Market-data provider seam, canonicalization and resampling

pub mod data;
pub mod domain;
pub mod indicators;
pub mod signal;
pub mod strategy;

pub use domain::{Interval, PositionSide, PositionState, PriceBar};
pub use indicators::{compute, SarError, SarParams, SarSeries, Trend};
pub use signal::{classify, Signal};

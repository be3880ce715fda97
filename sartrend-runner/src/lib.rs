//! SarTrend Runner — backtest replay, simulated account, metrics, sweeps.
//!
//! This crate builds on `sartrend-core` to provide:
//! - TOML backtest configuration with content-addressed run ids
//! - CSV candle loading and a file-backed market-data provider
//! - A leveraged contract account with margin, fees and trade records
//! - Bar-by-bar replay with confirmation selection and risk guards
//! - Performance metrics and parallel parameter sweeps

pub mod account;
pub mod config;
pub mod data_loader;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use account::{AccountError, SimAccount};
pub use config::{
    AccountConfig, BacktestConfig, ConfigError, MarketConfig, ReplayConfig, RiskConfig, RunId,
};
pub use data_loader::{dataset_hash, load_csv, CsvProvider, LoadError};
pub use metrics::PerformanceMetrics;
pub use runner::{
    run_backtest, run_prepared, BacktestResult, MarketData, RunError, SignalCounts, SCHEMA_VERSION,
};
pub use sweep::{ParamGrid, ParamSweep, RankBy, SweepResults};

//! Serializable backtest configuration.
//!
//! Loaded from TOML; every section has defaults so a file only needs to name
//! what it changes.

use std::path::Path;

use sartrend_core::domain::{Interval, Symbol};
use sartrend_core::indicators::{SarError, SarParams};
use sartrend_core::strategy::{StrategyConfig, StrategyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid SAR parameters: {0}")]
    Sar(#[from] SarError),

    #[error("invalid strategy settings: {0}")]
    Strategy(#[from] StrategyError),

    #[error("invalid [{section}] setting: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

fn invalid(section: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        message: message.into(),
    }
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub market: MarketConfig,
    pub sar: SarParams,
    pub strategy: StrategyConfig,
    pub account: AccountConfig,
    pub risk: RiskConfig,
    pub backtest: ReplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub instrument: Symbol,
    pub interval: Interval,
    /// Higher timeframe used for trend confirmation.
    pub confirm_interval: Interval,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            instrument: "XRP-USDT-SWAP".to_string(),
            interval: Interval::M15,
            confirm_interval: Interval::H1,
        }
    }
}

/// Simulated contract account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_capital: f64,
    /// Margin committed to each position (quote currency).
    pub margin_per_trade: f64,
    pub leverage: f64,
    /// Contract quantities are rounded to a multiple of this.
    pub contract_step: f64,
    pub min_contract: f64,
    /// Fraction of traded notional charged on every fill.
    pub fee_rate: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            margin_per_trade: 1_000.0,
            leverage: 2.0,
            contract_step: 0.1,
            min_contract: 0.01,
            fee_rate: 0.0005,
        }
    }
}

/// Entry guards applied by the runner. Zero disables a guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Stop opening positions after this many losing trades in a row.
    pub max_consecutive_losses: usize,
    /// Bars to wait after a close before opening again.
    pub cooldown_bars: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 4,
            cooldown_bars: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Bars skipped before the first evaluation.
    pub warmup_bars: usize,
    /// Length of the trailing window handed to the strategy; `None` passes
    /// the whole history up to the current bar.
    pub window: Option<usize>,
    /// Close any open position at the last bar.
    pub close_at_end: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            warmup_bars: 20,
            window: Some(100),
            close_at_end: true,
        }
    }
}

impl BacktestConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sar.validate()?;
        self.strategy.validate()?;

        if self.market.instrument.trim().is_empty() {
            return Err(invalid("market", "instrument must not be empty"));
        }
        if self.market.confirm_interval < self.market.interval {
            return Err(invalid(
                "market",
                format!(
                    "confirm_interval {} is finer than interval {}",
                    self.market.confirm_interval, self.market.interval
                ),
            ));
        }

        let a = &self.account;
        for (name, value) in [
            ("initial_capital", a.initial_capital),
            ("margin_per_trade", a.margin_per_trade),
            ("leverage", a.leverage),
            ("contract_step", a.contract_step),
            ("min_contract", a.min_contract),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid("account", format!("{name} must be positive, got {value}")));
            }
        }
        if !(a.fee_rate.is_finite() && (0.0..1.0).contains(&a.fee_rate)) {
            return Err(invalid(
                "account",
                format!("fee_rate must be in [0, 1), got {}", a.fee_rate),
            ));
        }
        if a.margin_per_trade > a.initial_capital {
            return Err(invalid("account", "margin_per_trade exceeds initial_capital"));
        }

        if let Some(window) = self.backtest.window {
            if window < self.strategy.min_history {
                return Err(invalid(
                    "backtest",
                    format!(
                        "window {window} is shorter than strategy.min_history {}",
                        self.strategy.min_history
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Deterministic hash of the serialized configuration.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> RunId {
        // Every field is a plain number, string or enum, so serialization
        // cannot fail; fall back to Debug output rather than panic.
        let text = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }
}

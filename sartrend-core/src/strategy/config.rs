//! Strategy tuning knobs. Every field has a default so a TOML section may
//! name only what it changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("invalid strategy config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Sar(#[from] crate::indicators::SarError),
}

/// What to do when the SAR turns against an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    /// Close and wait for the next entry signal.
    #[default]
    Close,
    /// Close and immediately open the opposite side.
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Bars required before any decision other than Hold.
    pub min_history: usize,

    /// Close when unrealized pnl / entry price reaches this fraction.
    pub take_profit: Option<f64>,
    /// Close when unrealized pnl / entry price falls to minus this fraction.
    pub stop_loss: Option<f64>,
    pub exit_mode: ExitMode,

    /// Only enter on the bar where the SAR trend just flipped.
    pub require_flip: bool,

    /// Require the confirmation timeframe to agree before entering.
    pub use_confirmation: bool,
    /// Confirmation series shorter than this is treated as neutral.
    pub confirm_min_bars: usize,

    pub atr_period: usize,
    /// Minimum ATR / close for an entry; `None` disables the filter.
    pub volatility_threshold: Option<f64>,

    /// Bars averaged for the volume baseline.
    pub volume_lookback: usize,
    /// Minimum volume / baseline for an entry; `None` disables the filter.
    pub volume_threshold: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_history: 20,
            take_profit: Some(0.02),
            stop_loss: Some(0.01),
            exit_mode: ExitMode::Close,
            require_flip: false,
            use_confirmation: true,
            confirm_min_bars: 10,
            atr_period: 14,
            volatility_threshold: None,
            volume_lookback: 10,
            volume_threshold: None,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        let positive = |name: &str, v: Option<f64>| match v {
            Some(x) if !(x.is_finite() && x > 0.0) => Err(StrategyError::InvalidConfig(format!(
                "{name} must be finite and > 0, got {x}"
            ))),
            _ => Ok(()),
        };
        positive("take_profit", self.take_profit)?;
        positive("stop_loss", self.stop_loss)?;
        positive("volatility_threshold", self.volatility_threshold)?;
        positive("volume_threshold", self.volume_threshold)?;

        if self.min_history < 2 {
            return Err(StrategyError::InvalidConfig(format!(
                "min_history must be >= 2, got {}",
                self.min_history
            )));
        }
        if self.confirm_min_bars < 2 {
            return Err(StrategyError::InvalidConfig(format!(
                "confirm_min_bars must be >= 2, got {}",
                self.confirm_min_bars
            )));
        }
        if self.atr_period == 0 {
            return Err(StrategyError::InvalidConfig("atr_period must be >= 1".into()));
        }
        if self.volume_lookback == 0 {
            return Err(StrategyError::InvalidConfig(
                "volume_lookback must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

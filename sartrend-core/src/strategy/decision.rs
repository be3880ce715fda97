//! Strategy output: what to do on this bar and why.

use crate::domain::{ExitReason, PositionSide};
use crate::indicators::SarPoint;
use crate::signal::Signal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Hold,
    Open(PositionSide),
    Close,
    /// Close the open position and open the given side.
    Flip(PositionSide),
}

/// Higher-timeframe bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Confirmation {
    pub fn from_signal(signal: Signal) -> Self {
        match signal {
            Signal::Buy => Self::Bullish,
            Signal::Sell => Self::Bearish,
            Signal::Hold => Self::Neutral,
        }
    }

    pub fn agrees_with(self, side: PositionSide) -> bool {
        matches!(
            (self, side),
            (Self::Bullish, PositionSide::Long) | (Self::Bearish, PositionSide::Short)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    InsufficientHistory,
    /// Flat and the classifier said Hold.
    NoSignal,
    /// Signal present but the trend did not flip on this bar.
    NotAFlip,
    ConfirmationMismatch,
    LowVolatility,
    LowVolume,
    Entry,
    /// In a position and no exit rule fired.
    Holding,
    TakeProfit,
    StopLoss,
    SarReversal,
    /// Blocked by the runner's losing-streak guard.
    LossStreakHalt,
    /// Blocked by the runner's post-trade cooldown.
    Cooldown,
    /// Entry signalled but the account could not cover margin and fee.
    InsufficientCash,
}

impl DecisionReason {
    pub fn exit_reason(self) -> Option<ExitReason> {
        match self {
            Self::TakeProfit => Some(ExitReason::TakeProfit),
            Self::StopLoss => Some(ExitReason::StopLoss),
            Self::SarReversal => Some(ExitReason::SarReversal),
            _ => None,
        }
    }

    /// True for reasons that turned a raw signal away.
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            Self::NotAFlip
                | Self::ConfirmationMismatch
                | Self::LowVolatility
                | Self::LowVolume
                | Self::LossStreakHalt
                | Self::Cooldown
                | Self::InsufficientCash
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub reason: DecisionReason,
    /// Close of the last bar evaluated.
    pub price: f64,
    /// Last SAR point; `None` when there was too little history to compute it.
    pub sar: Option<SarPoint>,
    pub signal: Signal,
    pub confirmation: Confirmation,
}

impl Decision {
    pub fn hold(reason: DecisionReason, price: f64) -> Self {
        Self {
            action: TradeAction::Hold,
            reason,
            price,
            sar: None,
            signal: Signal::Hold,
            confirmation: Confirmation::Neutral,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }
}

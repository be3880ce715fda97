//! TradeRecord — a completed round-trip trade on a margined contract.

use super::position::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    SarReversal,
    /// Closed by the runner at the last bar of the replay.
    EndOfData,
}

/// A complete round-trip trade record: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    /// Contracts held.
    pub size: f64,
    /// Margin reserved when the trade was opened.
    pub margin: f64,
    pub leverage: f64,

    // ── PnL ──
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
}

impl TradeRecord {
    /// Return on margin, the figure a leveraged trader actually sees.
    pub fn return_on_margin(&self) -> f64 {
        if self.margin == 0.0 {
            return 0.0;
        }
        self.net_pnl / self.margin
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

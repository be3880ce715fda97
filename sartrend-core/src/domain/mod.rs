//! Domain types: candles, intervals, positions, trades.

pub mod bar;
pub mod interval;
pub mod position;
pub mod trade;

pub use bar::PriceBar;
pub use interval::{Interval, IntervalParseError};
pub use position::{ClosedPosition, PositionError, PositionSide, PositionState};
pub use trade::{ExitReason, TradeRecord};

/// Instrument identifier, e.g. `"XRP_USDT"`.
pub type Symbol = String;

//! Position state as a tagged variant with explicit transitions.
//!
//! A position is either flat, long, or short. The only ways to move between
//! states are `open`, `close`, and `flip`; each validates its input before
//! touching the state, so a rejected transition leaves the position as it was.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("cannot open {requested:?}: a {current:?} position is already open")]
    AlreadyOpen {
        current: PositionSide,
        requested: PositionSide,
    },

    #[error("no open position")]
    NotOpen,

    #[error("invalid price {0} (must be finite and > 0)")]
    InvalidPrice(f64),

    #[error("invalid size {0} (must be finite and > 0)")]
    InvalidSize(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// Current exposure of one strategy on one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionState {
    #[default]
    Flat,
    Long {
        entry_price: f64,
        size: f64,
    },
    Short {
        entry_price: f64,
        size: f64,
    },
}

/// Outcome of closing a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat)
    }

    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Self::Flat => None,
            Self::Long { .. } => Some(PositionSide::Long),
            Self::Short { .. } => Some(PositionSide::Short),
        }
    }

    pub fn entry_price(&self) -> Option<f64> {
        match *self {
            Self::Flat => None,
            Self::Long { entry_price, .. } | Self::Short { entry_price, .. } => Some(entry_price),
        }
    }

    /// Position size in contracts; zero when flat.
    pub fn size(&self) -> f64 {
        match *self {
            Self::Flat => 0.0,
            Self::Long { size, .. } | Self::Short { size, .. } => size,
        }
    }

    /// Unrealized PnL at `price` (quote currency).
    pub fn pnl(&self, price: f64) -> f64 {
        match (self.side(), self.entry_price()) {
            (Some(side), Some(entry)) => side.sign() * (price - entry) * self.size(),
            _ => 0.0,
        }
    }

    /// Unrealized PnL as a fraction of the entry price; zero when flat.
    pub fn pnl_ratio(&self, price: f64) -> f64 {
        match (self.side(), self.entry_price()) {
            (Some(side), Some(entry)) if entry > 0.0 => side.sign() * (price - entry) / entry,
            _ => 0.0,
        }
    }

    /// Open a new position. Only valid from `Flat`.
    pub fn open(&mut self, side: PositionSide, price: f64, size: f64) -> Result<(), PositionError> {
        check_price(price)?;
        check_size(size)?;
        if let Some(current) = self.side() {
            return Err(PositionError::AlreadyOpen {
                current,
                requested: side,
            });
        }
        *self = match side {
            PositionSide::Long => Self::Long {
                entry_price: price,
                size,
            },
            PositionSide::Short => Self::Short {
                entry_price: price,
                size,
            },
        };
        Ok(())
    }

    /// Close the open position at `price`, returning to `Flat`.
    pub fn close(&mut self, price: f64) -> Result<ClosedPosition, PositionError> {
        check_price(price)?;
        let (side, entry_price) = match (self.side(), self.entry_price()) {
            (Some(side), Some(entry)) => (side, entry),
            _ => return Err(PositionError::NotOpen),
        };
        let closed = ClosedPosition {
            side,
            entry_price,
            exit_price: price,
            size: self.size(),
            pnl: self.pnl(price),
        };
        *self = Self::Flat;
        Ok(closed)
    }

    /// Close the open position and open the opposite side at the same price.
    pub fn flip(&mut self, price: f64, new_size: f64) -> Result<ClosedPosition, PositionError> {
        check_price(price)?;
        check_size(new_size)?;
        let side = self.side().ok_or(PositionError::NotOpen)?;
        let closed = self.close(price)?;
        self.open(side.opposite(), price, new_size)?;
        Ok(closed)
    }
}

fn check_price(price: f64) -> Result<(), PositionError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(PositionError::InvalidPrice(price))
    }
}

fn check_size(size: f64) -> Result<(), PositionError> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(PositionError::InvalidSize(size))
    }
}

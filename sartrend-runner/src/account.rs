//! Simulated leveraged contract account.
//!
//! Each position commits a fixed margin; its contract quantity is the
//! leveraged notional divided by price, rounded to the contract step and
//! floored at the minimum contract. Fills happen at the bar close and pay
//! `fee_rate` of traded notional on both legs. No liquidation is modelled.

use chrono::{DateTime, Utc};
use sartrend_core::domain::{
    ClosedPosition, ExitReason, PositionError, PositionSide, PositionState, PriceBar, TradeRecord,
};
use thiserror::Error;
use tracing::debug;

use crate::config::AccountConfig;

#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    #[error("insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error(transparent)]
    Position(#[from] PositionError),
}

/// Bookkeeping for the open leg that `PositionState` does not carry.
#[derive(Debug, Clone, Copy)]
struct OpenLeg {
    entry_bar: usize,
    entry_time: DateTime<Utc>,
    margin: f64,
    entry_fee: f64,
}

#[derive(Debug, Clone)]
pub struct SimAccount {
    config: AccountConfig,
    cash: f64,
    position: PositionState,
    leg: Option<OpenLeg>,
    trades: Vec<TradeRecord>,
}

impl SimAccount {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            cash: config.initial_capital,
            config,
            position: PositionState::Flat,
            leg: None,
            trades: Vec::new(),
        }
    }

    /// Free cash, excluding margin reserved by the open position.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    /// Cash plus reserved margin plus unrealized PnL at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        let margin = self.leg.map_or(0.0, |leg| leg.margin);
        self.cash + margin + self.position.pnl(price)
    }

    /// Contract quantity for a new position at `price`.
    pub fn contract_size(&self, price: f64) -> f64 {
        let notional = self.config.margin_per_trade * self.config.leverage;
        let step = self.config.contract_step;
        let rounded = (notional / price / step).round() * step;
        rounded.max(self.config.min_contract)
    }

    fn fee(&self, price: f64, size: f64) -> f64 {
        price * size * self.config.fee_rate
    }

    /// Open `side` at the close of `bar`.
    pub fn open(&mut self, side: PositionSide, index: usize, bar: &PriceBar) -> Result<(), AccountError> {
        let price = bar.close;
        let size = self.contract_size(price);
        let entry_fee = self.fee(price, size);
        let required = self.config.margin_per_trade + entry_fee;
        if self.cash < required {
            return Err(AccountError::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        self.position.open(side, price, size)?;
        self.reserve(index, bar.timestamp, entry_fee);
        debug!(?side, price, size, bar = index, "opened position");
        Ok(())
    }

    /// Close the open position at the close of `bar`.
    pub fn close(
        &mut self,
        index: usize,
        bar: &PriceBar,
        reason: ExitReason,
    ) -> Result<TradeRecord, AccountError> {
        let leg = self.leg.ok_or(PositionError::NotOpen)?;
        let exit_fee = self.fee(bar.close, self.position.size());
        let closed = self.position.close(bar.close)?;
        Ok(self.settle(leg, closed, exit_fee, index, bar.timestamp, reason))
    }

    /// Close and open the opposite side at the close of `bar`.
    ///
    /// Fails without touching the position when the proceeds of the close
    /// would not cover the new margin.
    pub fn flip(
        &mut self,
        index: usize,
        bar: &PriceBar,
        reason: ExitReason,
    ) -> Result<TradeRecord, AccountError> {
        let leg = self.leg.ok_or(PositionError::NotOpen)?;
        let price = bar.close;
        let new_size = self.contract_size(price);
        let exit_fee = self.fee(price, self.position.size());
        let entry_fee = self.fee(price, new_size);

        let available = self.cash + leg.margin + self.position.pnl(price) - exit_fee;
        let required = self.config.margin_per_trade + entry_fee;
        if available < required {
            return Err(AccountError::InsufficientCash {
                required,
                available,
            });
        }

        let closed = self.position.flip(price, new_size)?;
        let record = self.settle(leg, closed, exit_fee, index, bar.timestamp, reason);
        self.reserve(index, bar.timestamp, entry_fee);
        debug!(side = ?closed.side.opposite(), price, size = new_size, bar = index, "flipped position");
        Ok(record)
    }

    fn reserve(&mut self, index: usize, time: DateTime<Utc>, entry_fee: f64) {
        let margin = self.config.margin_per_trade;
        self.cash -= margin + entry_fee;
        self.leg = Some(OpenLeg {
            entry_bar: index,
            entry_time: time,
            margin,
            entry_fee,
        });
    }

    fn settle(
        &mut self,
        leg: OpenLeg,
        closed: ClosedPosition,
        exit_fee: f64,
        index: usize,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> TradeRecord {
        self.cash += leg.margin + closed.pnl - exit_fee;
        self.leg = None;

        let fees = leg.entry_fee + exit_fee;
        let record = TradeRecord {
            side: closed.side,
            entry_bar: leg.entry_bar,
            entry_time: leg.entry_time,
            entry_price: closed.entry_price,
            exit_bar: index,
            exit_time: time,
            exit_price: closed.exit_price,
            exit_reason: reason,
            size: closed.size,
            margin: leg.margin,
            leverage: self.config.leverage,
            gross_pnl: closed.pnl,
            fees,
            net_pnl: closed.pnl - fees,
        };
        debug!(
            side = ?record.side,
            reason = ?reason,
            net_pnl = record.net_pnl,
            bars_held = record.bars_held(),
            "closed trade"
        );
        self.trades.push(record.clone());
        record
    }
}

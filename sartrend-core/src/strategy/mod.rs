//! SAR trend-following strategy.
//!
//! Evaluates one window of base-interval bars (plus an optional
//! confirmation-interval window) against the current position and returns a
//! [`Decision`]. The strategy holds no mutable state; the caller owns the
//! position and applies the action.
//!
//! Exit rules, checked in order while in a position:
//! 1. take-profit on pnl ratio
//! 2. stop-loss on pnl ratio
//! 3. SAR reversal (trend turned, or close crossed the SAR)
//!
//! Entry gates, checked in order while flat: classifier signal,
//! `require_flip`, confirmation timeframe, volatility, volume.

pub mod config;
pub mod decision;

pub use config::{ExitMode, StrategyConfig, StrategyError};
pub use decision::{Confirmation, Decision, DecisionReason, TradeAction};

use crate::domain::{PositionSide, PositionState, PriceBar};
use crate::indicators::{compute, Atr, SarParams, SarPoint, SarSeries, Trend};
use crate::signal::{classify, classify_latest, Signal};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SarStrategy {
    params: SarParams,
    config: StrategyConfig,
    atr: Atr,
}

impl SarStrategy {
    pub fn new(params: SarParams, config: StrategyConfig) -> Result<Self, StrategyError> {
        params.validate()?;
        config.validate()?;
        Ok(Self {
            atr: Atr::new(config.atr_period),
            params,
            config,
        })
    }

    pub fn params(&self) -> &SarParams {
        &self.params
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Decide what to do at the last bar of `bars`.
    ///
    /// `bars` must be chronological and duplicate-free; a malformed bar
    /// surfaces as [`StrategyError::Sar`].
    pub fn evaluate(
        &self,
        bars: &[PriceBar],
        confirm_bars: Option<&[PriceBar]>,
        position: &PositionState,
    ) -> Result<Decision, StrategyError> {
        let Some(last) = bars.last() else {
            return Ok(Decision::hold(DecisionReason::InsufficientHistory, f64::NAN));
        };
        let price = last.close;

        if bars.len() < self.config.min_history {
            return Ok(Decision::hold(DecisionReason::InsufficientHistory, price));
        }

        let series = compute(bars, &self.params)?;
        let Some(&point) = series.last() else {
            return Ok(Decision::hold(DecisionReason::InsufficientHistory, price));
        };
        let signal = classify(price, point.value, point.trend);

        let decision = match position.side() {
            Some(side) => self.manage(side, position, price, point, signal),
            None => self.enter(bars, &series, confirm_bars, price, point, signal),
        };

        debug!(
            action = ?decision.action,
            reason = ?decision.reason,
            price,
            sar = point.value,
            trend = ?point.trend,
            "strategy decision"
        );
        Ok(decision)
    }

    /// Exit rules for an open position.
    fn manage(
        &self,
        side: PositionSide,
        position: &PositionState,
        price: f64,
        point: SarPoint,
        signal: Signal,
    ) -> Decision {
        let ratio = position.pnl_ratio(price);
        let decide = |action, reason| Decision {
            action,
            reason,
            price,
            sar: Some(point),
            signal,
            confirmation: Confirmation::Neutral,
        };

        if self.config.take_profit.is_some_and(|tp| ratio >= tp) {
            return decide(TradeAction::Close, DecisionReason::TakeProfit);
        }
        if self.config.stop_loss.is_some_and(|sl| ratio <= -sl) {
            return decide(TradeAction::Close, DecisionReason::StopLoss);
        }

        let reversed = match side {
            PositionSide::Long => point.trend == Trend::Falling || price < point.value,
            PositionSide::Short => point.trend == Trend::Rising || price > point.value,
        };
        if reversed {
            let action = match self.config.exit_mode {
                ExitMode::Close => TradeAction::Close,
                ExitMode::Reverse => TradeAction::Flip(side.opposite()),
            };
            return decide(action, DecisionReason::SarReversal);
        }

        decide(TradeAction::Hold, DecisionReason::Holding)
    }

    /// Entry gates while flat.
    fn enter(
        &self,
        bars: &[PriceBar],
        series: &SarSeries,
        confirm_bars: Option<&[PriceBar]>,
        price: f64,
        point: SarPoint,
        signal: Signal,
    ) -> Decision {
        let mut decision = Decision {
            action: TradeAction::Hold,
            reason: DecisionReason::NoSignal,
            price,
            sar: Some(point),
            signal,
            confirmation: Confirmation::Neutral,
        };

        let side = match signal {
            Signal::Buy => PositionSide::Long,
            Signal::Sell => PositionSide::Short,
            Signal::Hold => return decision,
        };

        if self.config.require_flip && !series.is_reversal(series.len() - 1) {
            decision.reason = DecisionReason::NotAFlip;
            return decision;
        }

        if self.config.use_confirmation {
            decision.confirmation = self.confirmation(confirm_bars);
            if !decision.confirmation.agrees_with(side) {
                decision.reason = DecisionReason::ConfirmationMismatch;
                return decision;
            }
        }

        if let Some(threshold) = self.config.volatility_threshold {
            let passes = self
                .atr
                .latest(bars)
                .is_some_and(|atr| price > 0.0 && atr / price >= threshold);
            if !passes {
                decision.reason = DecisionReason::LowVolatility;
                return decision;
            }
        }

        if let Some(threshold) = self.config.volume_threshold {
            let passes =
                volume_ratio(bars, self.config.volume_lookback).is_some_and(|r| r >= threshold);
            if !passes {
                decision.reason = DecisionReason::LowVolume;
                return decision;
            }
        }

        decision.action = TradeAction::Open(side);
        decision.reason = DecisionReason::Entry;
        decision
    }

    /// Classify the confirmation window. Missing, short or malformed data is Neutral.
    pub fn confirmation(&self, confirm_bars: Option<&[PriceBar]>) -> Confirmation {
        let Some(bars) = confirm_bars else {
            return Confirmation::Neutral;
        };
        if bars.len() < self.config.confirm_min_bars {
            return Confirmation::Neutral;
        }
        match compute(bars, &self.params) {
            Ok(series) => Confirmation::from_signal(classify_latest(bars, &series)),
            Err(err) => {
                warn!(%err, "confirmation series rejected");
                Confirmation::Neutral
            }
        }
    }
}

/// Last bar's volume over the mean of the `lookback` bars before it.
///
/// `None` when the history is too short, any volume is missing, or the
/// baseline is zero.
pub fn volume_ratio(bars: &[PriceBar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() <= lookback {
        return None;
    }
    let (last, rest) = bars.split_last()?;
    let current = last.volume?;
    let window = &rest[rest.len() - lookback..];
    let mut sum = 0.0;
    for bar in window {
        sum += bar.volume?;
    }
    let mean = sum / lookback as f64;
    (mean > 0.0).then(|| current / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, make_hl_bars};

    fn uptrend(n: usize) -> Vec<PriceBar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        make_bars(&closes)
    }

    fn downtrend(n: usize) -> Vec<PriceBar> {
        let closes: Vec<f64> = (0..n).map(|i| 200.0 - i as f64).collect();
        make_bars(&closes)
    }

    fn no_confirm() -> StrategyConfig {
        StrategyConfig {
            use_confirmation: false,
            ..Default::default()
        }
    }

    fn strategy(config: StrategyConfig) -> SarStrategy {
        SarStrategy::new(SarParams::default(), config).unwrap()
    }

    #[test]
    fn short_history_holds() {
        let s = strategy(no_confirm());
        let d = s.evaluate(&uptrend(10), None, &PositionState::Flat).unwrap();
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.reason, DecisionReason::InsufficientHistory);
        assert!(d.sar.is_none());

        let d = s.evaluate(&[], None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::InsufficientHistory);
    }

    #[test]
    fn opens_long_in_uptrend() {
        let d = strategy(no_confirm())
            .evaluate(&uptrend(30), None, &PositionState::Flat)
            .unwrap();
        assert_eq!(d.action, TradeAction::Open(PositionSide::Long));
        assert_eq!(d.reason, DecisionReason::Entry);
        assert_eq!(d.signal, Signal::Buy);
    }

    #[test]
    fn opens_short_in_downtrend() {
        let d = strategy(no_confirm())
            .evaluate(&downtrend(30), None, &PositionState::Flat)
            .unwrap();
        assert_eq!(d.action, TradeAction::Open(PositionSide::Short));
    }

    #[test]
    fn confirmation_must_agree() {
        let s = strategy(StrategyConfig::default());
        let bars = uptrend(30);

        let d = s.evaluate(&bars, None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::ConfirmationMismatch);
        assert_eq!(d.confirmation, Confirmation::Neutral);

        let bearish = downtrend(15);
        let d = s.evaluate(&bars, Some(&bearish), &PositionState::Flat).unwrap();
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.reason, DecisionReason::ConfirmationMismatch);
        assert_eq!(d.confirmation, Confirmation::Bearish);

        let bullish = uptrend(15);
        let d = s.evaluate(&bars, Some(&bullish), &PositionState::Flat).unwrap();
        assert_eq!(d.action, TradeAction::Open(PositionSide::Long));
        assert_eq!(d.confirmation, Confirmation::Bullish);
    }

    #[test]
    fn short_confirmation_is_neutral() {
        let s = strategy(StrategyConfig::default());
        assert_eq!(s.confirmation(Some(&uptrend(5))), Confirmation::Neutral);
    }

    #[test]
    fn require_flip_blocks_continuation() {
        let s = strategy(StrategyConfig {
            require_flip: true,
            ..no_confirm()
        });
        let d = s.evaluate(&uptrend(30), None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::NotAFlip);
    }

    #[test]
    fn require_flip_allows_the_flip_bar() {
        // Falling run, then a bar that breaks above the SAR.
        let mut pairs: Vec<(f64, f64)> = (0..25)
            .map(|i| (120.0 - i as f64, 118.0 - i as f64))
            .collect();
        pairs.push((130.0, 97.0));
        let bars = make_hl_bars(&pairs);
        let s = strategy(StrategyConfig {
            require_flip: true,
            ..no_confirm()
        });
        let d = s.evaluate(&bars, None, &PositionState::Flat).unwrap();
        assert_eq!(d.sar.unwrap().trend, Trend::Rising);
        assert_eq!(d.action, TradeAction::Open(PositionSide::Long));
    }

    #[test]
    fn volatility_filter_rejects_quiet_market() {
        let s = strategy(StrategyConfig {
            volatility_threshold: Some(0.5),
            ..no_confirm()
        });
        let d = s.evaluate(&uptrend(30), None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::LowVolatility);

        let s = strategy(StrategyConfig {
            volatility_threshold: Some(0.001),
            ..no_confirm()
        });
        let d = s.evaluate(&uptrend(30), None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::Entry);
    }

    #[test]
    fn volume_filter_needs_a_spike() {
        let s = strategy(StrategyConfig {
            volume_threshold: Some(1.5),
            ..no_confirm()
        });
        let mut bars = uptrend(30);
        let d = s.evaluate(&bars, None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::LowVolume);

        bars.last_mut().unwrap().volume = Some(2000.0);
        let d = s.evaluate(&bars, None, &PositionState::Flat).unwrap();
        assert_eq!(d.reason, DecisionReason::Entry);
    }

    #[test]
    fn take_profit_and_stop_loss() {
        let s = strategy(no_confirm());
        let bars = uptrend(30);
        let close = bars.last().unwrap().close;

        let mut winner = PositionState::Flat;
        winner.open(PositionSide::Long, close / 1.05, 1.0).unwrap();
        let d = s.evaluate(&bars, None, &winner).unwrap();
        assert_eq!(d.action, TradeAction::Close);
        assert_eq!(d.reason, DecisionReason::TakeProfit);

        let mut loser = PositionState::Flat;
        loser.open(PositionSide::Short, close / 1.05, 1.0).unwrap();
        let d = s.evaluate(&bars, None, &loser).unwrap();
        assert_eq!(d.reason, DecisionReason::StopLoss);
    }

    #[test]
    fn reversal_closes_or_flips() {
        let bars = downtrend(30);
        let close = bars.last().unwrap().close;
        let mut long = PositionState::Flat;
        long.open(PositionSide::Long, close, 1.0).unwrap();

        let no_targets = StrategyConfig {
            take_profit: None,
            stop_loss: None,
            ..no_confirm()
        };
        let d = strategy(no_targets.clone()).evaluate(&bars, None, &long).unwrap();
        assert_eq!(d.action, TradeAction::Close);
        assert_eq!(d.reason, DecisionReason::SarReversal);

        let d = strategy(StrategyConfig {
            exit_mode: ExitMode::Reverse,
            ..no_targets
        })
        .evaluate(&bars, None, &long)
        .unwrap();
        assert_eq!(d.action, TradeAction::Flip(PositionSide::Short));
    }

    #[test]
    fn holds_position_while_trend_agrees() {
        let bars = uptrend(30);
        let close = bars.last().unwrap().close;
        let mut long = PositionState::Flat;
        long.open(PositionSide::Long, close, 1.0).unwrap();
        let d = strategy(no_confirm()).evaluate(&bars, None, &long).unwrap();
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.reason, DecisionReason::Holding);
    }

    #[test]
    fn malformed_window_is_an_error() {
        let mut bars = uptrend(30);
        bars[10].low = f64::NAN;
        let err = strategy(no_confirm())
            .evaluate(&bars, None, &PositionState::Flat)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Sar(_)));
    }

    #[test]
    fn volume_ratio_edge_cases() {
        let bars = uptrend(5);
        assert_eq!(volume_ratio(&bars, 10), None);
        assert_eq!(volume_ratio(&bars, 4), Some(1.0));

        let mut missing = uptrend(12);
        missing[5].volume = None;
        assert_eq!(volume_ratio(&missing, 10), None);
    }
}

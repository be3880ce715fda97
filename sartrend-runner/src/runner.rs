//! Backtest replay: feed growing windows through the strategy and execute
//! its decisions on a simulated account.
//!
//! Flow: canonicalize data → for each bar after warmup: slice window →
//! select completed confirmation bars → evaluate → apply risk guards →
//! fill at the close → mark equity. Confirmation bars come either from a
//! separate series (only those closed by the end of the current bar) or from
//! resampling the base window into completed higher-timeframe buckets.

use std::collections::BTreeMap;
use std::path::Path;

use sartrend_core::data::{canonicalize, completed_by, resample, tail, validate_bars, DataError};
use sartrend_core::domain::{ExitReason, PositionState, PriceBar, TradeRecord};
use sartrend_core::signal::Signal;
use sartrend_core::strategy::{DecisionReason, SarStrategy, StrategyError, TradeAction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::account::{AccountError, SimAccount};
use crate::config::{BacktestConfig, ConfigError, RiskConfig, RunId};
use crate::data_loader::dataset_hash;
use crate::metrics::PerformanceMetrics;

/// Current schema version for BacktestResult serialization.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Errors from running a backtest.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("{have} bars cannot cover a warmup of {warmup}")]
    NotEnoughBars { have: usize, warmup: usize },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Canonical base series plus an optional confirmation series.
#[derive(Debug, Clone)]
pub struct MarketData {
    bars: Vec<PriceBar>,
    confirm: Option<Vec<PriceBar>>,
    dataset_hash: String,
}

impl MarketData {
    /// Sort, de-duplicate and validate both series.
    pub fn new(bars: Vec<PriceBar>, confirm: Option<Vec<PriceBar>>) -> Result<Self, DataError> {
        let (bars, _) = canonicalize(bars);
        validate_bars(&bars)?;
        let confirm = match confirm {
            Some(c) => {
                let (c, _) = canonicalize(c);
                validate_bars(&c)?;
                Some(c)
            }
            None => None,
        };

        let mut hash = dataset_hash(&bars);
        if let Some(c) = &confirm {
            let combined = format!("{hash}:{}", dataset_hash(c));
            hash = blake3::hash(combined.as_bytes()).to_hex().to_string();
        }
        Ok(Self {
            bars,
            confirm,
            dataset_hash: hash,
        })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn confirm(&self) -> Option<&[PriceBar]> {
        self.confirm.as_deref()
    }

    pub fn dataset_hash(&self) -> &str {
        &self.dataset_hash
    }
}

/// Classifier output tallies over replayed bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

impl SignalCounts {
    fn record(&mut self, signal: Signal) {
        match signal {
            Signal::Buy => self.buy += 1,
            Signal::Sell => self.sell += 1,
            Signal::Hold => self.hold += 1,
        }
    }
}

/// Full result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub config: BacktestConfig,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    /// Account equity at the close of each replayed bar.
    pub equity_curve: Vec<f64>,
    pub final_position: PositionState,
    pub signal_counts: SignalCounts,
    pub decision_counts: BTreeMap<DecisionReason, usize>,
    /// Bars in the base series.
    pub bar_count: usize,
    pub warmup_bars: usize,
}

impl BacktestResult {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RunError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn replayed_bars(&self) -> usize {
        self.equity_curve.len()
    }
}

/// Run one backtest over raw series.
pub fn run_backtest(
    config: &BacktestConfig,
    bars: &[PriceBar],
    confirm_bars: Option<&[PriceBar]>,
) -> Result<BacktestResult, RunError> {
    let data = MarketData::new(bars.to_vec(), confirm_bars.map(<[PriceBar]>::to_vec))?;
    run_prepared(config, &data)
}

/// Run one backtest over already-canonical data.
///
/// Each call builds its own strategy and account, so runs can proceed in
/// parallel over shared `MarketData`.
pub fn run_prepared(config: &BacktestConfig, data: &MarketData) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let bars = data.bars();
    let warmup = config.backtest.warmup_bars;
    if bars.len() <= warmup {
        return Err(RunError::NotEnoughBars {
            have: bars.len(),
            warmup,
        });
    }

    let strategy = SarStrategy::new(config.sar, config.strategy.clone())?;
    let mut account = SimAccount::new(config.account.clone());
    let mut guard = RiskGuard::new(config.risk.clone());
    let base = config.market.interval;
    let confirm_interval = config.market.confirm_interval;
    let use_confirmation = config.strategy.use_confirmation;

    let mut equity_curve = Vec::with_capacity(bars.len() - warmup);
    let mut signal_counts = SignalCounts::default();
    let mut decision_counts: BTreeMap<DecisionReason, usize> = BTreeMap::new();

    for i in warmup..bars.len() {
        let bar = &bars[i];
        let start = config
            .backtest
            .window
            .map_or(0, |w| (i + 1).saturating_sub(w));
        let window = &bars[start..=i];

        let resampled;
        let confirm = if !use_confirmation {
            None
        } else if let Some(series) = data.confirm() {
            let closed = completed_by(series, confirm_interval, bar.timestamp + base.duration());
            Some(match config.backtest.window {
                Some(w) => tail(closed, w),
                None => closed,
            })
        } else {
            resampled = resample(window, base, confirm_interval, true)?;
            Some(resampled.as_slice())
        };

        let mut decision = strategy.evaluate(window, confirm, account.position())?;
        signal_counts.record(decision.signal);

        if let Some(reason) = guard.blocks(i) {
            match decision.action {
                TradeAction::Open(_) => {
                    decision.action = TradeAction::Hold;
                    decision.reason = reason;
                }
                // Exit still happens; only the re-entry is withheld.
                TradeAction::Flip(_) => decision.action = TradeAction::Close,
                TradeAction::Hold | TradeAction::Close => {}
            }
        }
        let exit_reason = decision
            .reason
            .exit_reason()
            .unwrap_or(ExitReason::SarReversal);
        match decision.action {
            TradeAction::Hold => {}
            TradeAction::Open(side) => match account.open(side, i, bar) {
                Ok(()) => {}
                Err(AccountError::InsufficientCash {
                    required,
                    available,
                }) => {
                    warn!(bar = i, required, available, "entry skipped: insufficient cash");
                    decision.reason = DecisionReason::InsufficientCash;
                }
                Err(err) => return Err(err.into()),
            },
            TradeAction::Close => {
                let trade = account.close(i, bar, exit_reason)?;
                guard.on_exit(i, &trade);
            }
            TradeAction::Flip(_) => {
                let trade = match account.flip(i, bar, exit_reason) {
                    Ok(trade) => trade,
                    Err(AccountError::InsufficientCash { .. }) => {
                        warn!(bar = i, "flip downgraded to close: insufficient cash");
                        account.close(i, bar, exit_reason)?
                    }
                    Err(err) => return Err(err.into()),
                };
                guard.on_exit(i, &trade);
            }
        }
        *decision_counts.entry(decision.reason).or_insert(0) += 1;

        equity_curve.push(account.equity(bar.close));
    }

    if config.backtest.close_at_end && !account.position().is_flat() {
        let last_index = bars.len() - 1;
        let last = &bars[last_index];
        account.close(last_index, last, ExitReason::EndOfData)?;
        if let Some(eq) = equity_curve.last_mut() {
            *eq = account.equity(last.close);
        }
        debug!(bar = last_index, "closed open position at end of data");
    }

    let final_position = *account.position();
    let trades = account.into_trades();
    let mut curve_with_start = Vec::with_capacity(equity_curve.len() + 1);
    curve_with_start.push(config.account.initial_capital);
    curve_with_start.extend_from_slice(&equity_curve);
    let metrics = PerformanceMetrics::compute(&curve_with_start, &trades, base);

    let run_id = config.run_id();
    let short_id = run_id.get(..12).unwrap_or(&run_id);
    info!(
        run_id = short_id,
        instrument = %config.market.instrument,
        bars = bars.len(),
        trades = metrics.trade_count,
        total_return = metrics.total_return,
        max_drawdown = metrics.max_drawdown,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        dataset_hash: data.dataset_hash().to_string(),
        config: config.clone(),
        metrics,
        trades,
        equity_curve,
        final_position,
        signal_counts,
        decision_counts,
        bar_count: bars.len(),
        warmup_bars: warmup,
    })
}

/// Losing-streak halt and post-exit cooldown.
#[derive(Debug, Clone)]
struct RiskGuard {
    config: RiskConfig,
    losing_streak: usize,
    last_exit: Option<usize>,
}

impl RiskGuard {
    fn new(config: RiskConfig) -> Self {
        Self {
            config,
            losing_streak: 0,
            last_exit: None,
        }
    }

    /// Reason new exposure is blocked at bar `i`, if any.
    fn blocks(&self, i: usize) -> Option<DecisionReason> {
        let max = self.config.max_consecutive_losses;
        if max > 0 && self.losing_streak >= max {
            return Some(DecisionReason::LossStreakHalt);
        }
        let cooldown = self.config.cooldown_bars;
        if cooldown > 0 && self.last_exit.is_some_and(|e| i - e < cooldown) {
            return Some(DecisionReason::Cooldown);
        }
        None
    }

    fn on_exit(&mut self, i: usize, trade: &TradeRecord) {
        self.last_exit = Some(i);
        if trade.is_winner() {
            self.losing_streak = 0;
        } else {
            self.losing_streak += 1;
            if self.losing_streak == self.config.max_consecutive_losses {
                warn!(streak = self.losing_streak, bar = i, "losing streak limit reached");
            }
        }
    }
}

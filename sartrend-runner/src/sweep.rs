//! Parameter sweep over the SAR acceleration-factor schedule.

use std::collections::HashMap;
use std::str::FromStr;

use rayon::prelude::*;
use sartrend_core::indicators::SarParams;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BacktestConfig;
use crate::runner::{run_prepared, BacktestResult, MarketData, RunError};

/// Cartesian grid over `af_start × af_increment × af_maximum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub af_start: Vec<f64>,
    pub af_increment: Vec<f64>,
    pub af_maximum: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            af_start: vec![0.01, 0.02, 0.03],
            af_increment: vec![0.01, 0.02, 0.03],
            af_maximum: vec![0.1, 0.2, 0.3],
        }
    }
}

impl ParamGrid {
    /// Upper bound on the number of runs; invalid combinations are skipped.
    pub fn size(&self) -> usize {
        self.af_start.len() * self.af_increment.len() * self.af_maximum.len()
    }

    /// All valid parameter sets, in grid order.
    pub fn params(&self) -> Vec<SarParams> {
        let mut out = Vec::new();
        for &start in &self.af_start {
            for &increment in &self.af_increment {
                for &maximum in &self.af_maximum {
                    // Skip invalid combinations (start > maximum, non-positive).
                    if let Ok(p) = SarParams::new(start, increment, maximum) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        self.params()
            .into_iter()
            .map(|sar| BacktestConfig {
                sar,
                ..base.clone()
            })
            .collect()
    }
}

/// Metric used to rank sweep results, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    TotalReturn,
    Sharpe,
    ProfitFactor,
    WinRate,
    /// Shallowest drawdown first.
    MaxDrawdown,
}

impl RankBy {
    pub fn score(self, result: &BacktestResult) -> f64 {
        let m = &result.metrics;
        match self {
            Self::TotalReturn => m.total_return,
            Self::Sharpe => m.sharpe,
            Self::ProfitFactor => m.profit_factor,
            Self::WinRate => m.win_rate,
            Self::MaxDrawdown => m.max_drawdown,
        }
    }
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_return" | "return" => Ok(Self::TotalReturn),
            "sharpe" => Ok(Self::Sharpe),
            "profit_factor" => Ok(Self::ProfitFactor),
            "win_rate" => Ok(Self::WinRate),
            "max_drawdown" | "drawdown" => Ok(Self::MaxDrawdown),
            other => Err(format!(
                "unknown metric '{other}' (expected total_return, sharpe, profit_factor, win_rate, max_drawdown)"
            )),
        }
    }
}

/// Parameter sweep executor.
///
/// Every configuration runs against the same `MarketData` with its own
/// strategy and account.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &BacktestConfig,
        data: &MarketData,
    ) -> Result<SweepResults, RunError> {
        let configs = grid.generate_configs(base);
        info!(runs = configs.len(), parallel = self.parallel, "starting sweep");

        let results = if self.parallel {
            configs
                .par_iter()
                .map(|config| run_prepared(config, data))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            configs
                .iter()
                .map(|config| run_prepared(config, data))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(results))
    }
}

/// Results from a parameter sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(results: Vec<BacktestResult>) -> Self {
        let by_run_id = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { results, by_run_id }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.by_run_id.get(run_id).map(|&i| &self.results[i])
    }

    /// Results ordered best first by `metric`; ties keep grid order.
    pub fn ranked(&self, metric: RankBy) -> Vec<&BacktestResult> {
        let mut sorted: Vec<&BacktestResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| metric.score(b).total_cmp(&metric.score(a)));
        sorted
    }

    pub fn top_n(&self, metric: RankBy, n: usize) -> Vec<&BacktestResult> {
        let mut ranked = self.ranked(metric);
        ranked.truncate(n);
        ranked
    }

    pub fn best(&self, metric: RankBy) -> Option<&BacktestResult> {
        self.ranked(metric).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_skips_invalid_combinations() {
        let grid = ParamGrid {
            af_start: vec![0.02, 0.3],
            af_increment: vec![0.02],
            af_maximum: vec![0.2, 0.25],
        };
        assert_eq!(grid.size(), 4);
        // 0.3 exceeds both maxima.
        let params = grid.params();
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.af_start == 0.02));
    }

    #[test]
    fn configs_only_differ_in_sar() {
        let base = BacktestConfig::default();
        let configs = ParamGrid::default().generate_configs(&base);
        assert_eq!(configs.len(), 27);
        for c in &configs {
            assert_eq!(c.account, base.account);
            assert_eq!(c.strategy, base.strategy);
        }
        let ids: std::collections::HashSet<_> = configs.iter().map(|c| c.run_id()).collect();
        assert_eq!(ids.len(), 27);
    }

    #[test]
    fn rank_by_parses() {
        assert_eq!("sharpe".parse::<RankBy>().unwrap(), RankBy::Sharpe);
        assert_eq!("drawdown".parse::<RankBy>().unwrap(), RankBy::MaxDrawdown);
        assert!("alpha".parse::<RankBy>().is_err());
    }
}

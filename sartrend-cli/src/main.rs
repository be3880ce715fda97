//! SarTrend CLI — SAR series, latest signal, backtest and sweep commands.
//!
//! Commands:
//! - `sar`: compute the Parabolic SAR over a candle file
//! - `signal`: classify the latest bar, optionally with confirmation
//! - `backtest`: replay a TOML config over a candle file
//! - `sweep`: grid-search the acceleration-factor schedule

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sartrend_core::data::completed_by;
use sartrend_core::domain::PriceBar;
use sartrend_core::indicators::{compute, SarParams};
use sartrend_core::signal::classify_latest;
use sartrend_core::strategy::SarStrategy;
use sartrend_runner::{
    load_csv, run_backtest, BacktestConfig, BacktestResult, MarketData, ParamGrid, ParamSweep,
    RankBy,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sartrend",
    about = "SarTrend CLI — Parabolic SAR signals and contract backtests"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the SAR series for a candle file.
    Sar {
        /// CSV with timestamp,open,high,low,close[,volume].
        #[arg(long)]
        data: PathBuf,

        #[arg(long, default_value_t = 0.02)]
        af_start: f64,

        #[arg(long, default_value_t = 0.02)]
        af_increment: f64,

        #[arg(long, default_value_t = 0.2)]
        af_max: f64,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Only print the last N rows.
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Classify the latest bar as buy, sell or hold.
    Signal {
        #[arg(long)]
        data: PathBuf,

        /// Higher-timeframe candles for trend confirmation.
        #[arg(long)]
        confirm_data: Option<PathBuf>,

        /// TOML config supplying SAR parameters and strategy settings.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay a backtest from a TOML config file.
    Backtest {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        confirm_data: Option<PathBuf>,

        /// Write the full result as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sweep SAR parameters over a grid and rank the runs.
    Sweep {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        confirm_data: Option<PathBuf>,

        /// Comma-separated af_start values.
        #[arg(long, value_delimiter = ',', default_values_t = [0.01, 0.02, 0.03])]
        af_start: Vec<f64>,

        #[arg(long, value_delimiter = ',', default_values_t = [0.01, 0.02, 0.03])]
        af_increment: Vec<f64>,

        #[arg(long, value_delimiter = ',', default_values_t = [0.1, 0.2, 0.3])]
        af_max: Vec<f64>,

        /// total_return, sharpe, profit_factor, win_rate or max_drawdown.
        #[arg(long, default_value = "total_return")]
        rank_by: RankBy,

        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Sar {
            data,
            af_start,
            af_increment,
            af_max,
            json,
            tail,
        } => run_sar(&data, SarParams::new(af_start, af_increment, af_max)?, json, tail),
        Commands::Signal {
            data,
            confirm_data,
            config,
        } => run_signal(&data, confirm_data.as_deref(), config.as_deref()),
        Commands::Backtest {
            config,
            data,
            confirm_data,
            output,
        } => run_backtest_cmd(&config, &data, confirm_data.as_deref(), output.as_deref()),
        Commands::Sweep {
            config,
            data,
            confirm_data,
            af_start,
            af_increment,
            af_max,
            rank_by,
            top,
        } => {
            let grid = ParamGrid {
                af_start,
                af_increment,
                af_maximum: af_max,
            };
            run_sweep(&config, &data, confirm_data.as_deref(), &grid, rank_by, top)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Vec<PriceBar>> {
    load_csv(path).with_context(|| format!("loading {}", path.display()))
}

fn run_sar(data: &Path, params: SarParams, json: bool, tail: Option<usize>) -> Result<()> {
    let bars = load(data)?;
    let series = compute(&bars, &params)?;
    let skip = tail.map_or(0, |n| bars.len().saturating_sub(n));

    if json {
        let rows: Vec<serde_json::Value> = bars
            .iter()
            .zip(series.iter())
            .enumerate()
            .skip(skip)
            .map(|(i, (bar, point))| {
                serde_json::json!({
                    "timestamp": bar.timestamp,
                    "close": bar.close,
                    "sar": point.value,
                    "trend": point.trend,
                    "reversal": series.is_reversal(i),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:<26} {:>12} {:>12} {:<8}",
        "Timestamp", "Close", "SAR", "Trend"
    );
    println!("{}", "-".repeat(62));
    for (i, (bar, point)) in bars.iter().zip(series.iter()).enumerate().skip(skip) {
        let marker = if series.is_reversal(i) { " *" } else { "" };
        println!(
            "{:<26} {:>12.6} {:>12.6} {:<8}{marker}",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.close,
            point.value,
            format!("{:?}", point.trend),
        );
    }
    Ok(())
}

fn run_signal(data: &Path, confirm_data: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => BacktestConfig::from_file(path)?,
        None => BacktestConfig::default(),
    };
    let bars = load(data)?;
    let Some(last) = bars.last() else {
        bail!("{} contains no bars", data.display());
    };
    let series = compute(&bars, &config.sar)?;
    let signal = classify_latest(&bars, &series);

    println!("Bar:      {}", last.timestamp);
    println!("Close:    {:.6}", last.close);
    if let Some(point) = series.last() {
        println!("SAR:      {:.6} ({:?})", point.value, point.trend);
    }
    println!("Signal:   {signal}");

    if let Some(path) = confirm_data {
        let confirm = load(path)?;
        let cutoff = last.timestamp + config.market.interval.duration();
        let closed = completed_by(&confirm, config.market.confirm_interval, cutoff);
        let strategy = SarStrategy::new(config.sar, config.strategy.clone())?;
        let bias = strategy.confirmation(Some(closed));
        println!("Confirm:  {bias:?} ({} closed {} bars)", closed.len(), config.market.confirm_interval);
    }
    Ok(())
}

fn run_backtest_cmd(
    config_path: &Path,
    data: &Path,
    confirm_data: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)?;
    let bars = load(data)?;
    let confirm = confirm_data.map(load).transpose()?;

    let result = run_backtest(&config, &bars, confirm.as_deref())?;
    print_summary(&result);

    if let Some(path) = output {
        result.save(path)?;
        info!(path = %path.display(), "result saved");
    }
    Ok(())
}

fn run_sweep(
    config_path: &Path,
    data: &Path,
    confirm_data: Option<&Path>,
    grid: &ParamGrid,
    rank_by: RankBy,
    top: usize,
) -> Result<()> {
    let base = BacktestConfig::from_file(config_path)?;
    let bars = load(data)?;
    let confirm = confirm_data.map(load).transpose()?;
    let market = MarketData::new(bars, confirm)?;

    if grid.params().is_empty() {
        bail!("parameter grid has no valid combinations");
    }
    let results = ParamSweep::new().sweep(grid, &base, &market)?;

    println!(
        "{:<4} {:>8} {:>8} {:>8} {:>10} {:>10} {:>8} {:>7} {:>7}",
        "#", "start", "incr", "max", "return%", "maxDD%", "sharpe", "trades", "win%"
    );
    println!("{}", "-".repeat(80));
    for (rank, r) in results.top_n(rank_by, top).iter().enumerate() {
        let m = &r.metrics;
        println!(
            "{:<4} {:>8.3} {:>8.3} {:>8.3} {:>10.2} {:>10.2} {:>8.3} {:>7} {:>7.1}",
            rank + 1,
            r.config.sar.af_start,
            r.config.sar.af_increment,
            r.config.sar.af_maximum,
            m.total_return * 100.0,
            m.max_drawdown * 100.0,
            m.sharpe,
            m.trade_count,
            m.win_rate * 100.0,
        );
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Instrument:     {}", result.config.market.instrument);
    println!("Interval:       {}", result.config.market.interval);
    println!("Run:            {}", result.run_id);
    println!(
        "Bars:           {} ({} warmup)",
        result.bar_count, result.warmup_bars
    );
    println!(
        "Signals:        {} buy / {} sell / {} hold",
        result.signal_counts.buy, result.signal_counts.sell, result.signal_counts.hold
    );
    println!("Trades:         {} ({} won, {} lost)", m.trade_count, m.winning_trades, m.losing_trades);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Trade PnL:  {:.2}", m.avg_trade_pnl);
    println!("Fees Paid:      {:.2}", m.total_fees);
    println!("Max Consec Loss:{}", m.max_consecutive_losses);
    println!();
    println!("--- Decisions ---");
    for (reason, count) in &result.decision_counts {
        println!("{:<22}{count}", format!("{reason:?}"));
    }
    if !result.final_position.is_flat() {
        println!();
        println!("Open position at end: {:?}", result.final_position);
    }
    println!();
}

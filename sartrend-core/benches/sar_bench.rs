//! Criterion benchmarks for the SAR hot paths.
//!
//! Benchmarks:
//! 1. Batch `compute` over growing series lengths
//! 2. Step-wise recurrence over the same data
//! 3. Strategy evaluation on a backtest-sized window

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{TimeZone, Utc};
use sartrend_core::domain::{PositionState, PriceBar};
use sartrend_core::indicators::{compute, SarParams, SarRecurrence};
use sartrend_core::strategy::{SarStrategy, StrategyConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<PriceBar> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            PriceBar::new(
                t0 + chrono::Duration::minutes(15 * i as i64),
                open,
                close + 1.5,
                open.min(close) - 1.5,
                close,
            )
            .with_volume(1_000.0 + (i % 500) as f64)
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("sar_compute");
    for n in [100, 1_000, 10_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| compute(black_box(bars), &SarParams::default()))
        });
    }
    group.finish();
}

fn bench_recurrence(c: &mut Criterion) {
    let bars = make_bars(10_000);
    c.bench_function("sar_recurrence_10k", |b| {
        b.iter(|| {
            let (mut rec, _) =
                SarRecurrence::seed(SarParams::default(), &bars[0], &bars[1]).unwrap();
            for bar in &bars[1..] {
                black_box(rec.step(bar).unwrap());
            }
        })
    });
}

fn bench_strategy(c: &mut Criterion) {
    let bars = make_bars(200);
    let strategy = SarStrategy::new(SarParams::default(), StrategyConfig::default()).unwrap();
    c.bench_function("strategy_evaluate_200", |b| {
        b.iter(|| strategy.evaluate(black_box(&bars), None, &PositionState::Flat))
    });
}

criterion_group!(benches, bench_compute, bench_recurrence, bench_strategy);
criterion_main!(benches);

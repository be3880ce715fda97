//! Look-ahead contamination tests.
//!
//! Invariant: no SAR value, trend or engine state at bar t may depend on
//! price data from bar t+1 or later.
//!
//! Method: compute on a truncated series and on the full series and assert
//! the shared prefix is bit-identical.

use chrono::{TimeZone, Utc};
use sartrend_core::domain::PriceBar;
use sartrend_core::indicators::{compute, compute_with_states, Atr, Indicator, ParabolicSar, SarParams};

/// Generate N 15-minute bars with a deterministic pseudo-random walk.
fn make_test_bars(n: usize) -> Vec<PriceBar> {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;

    for i in 0..n {
        // Simple LCG
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed >> 33) % 200) as f64 * 0.05 - 5.0;
        price = (price + change).max(10.0);

        let open = price - 0.5;
        let close = price + 0.3;
        let high = open.max(close) + 2.0;
        let low = open.min(close) - 2.0;

        bars.push(
            PriceBar::new(t0 + chrono::Duration::minutes(15 * i as i64), open, high, low, close)
                .with_volume(1000.0 + i as f64 * 100.0),
        );
    }

    bars
}

fn assert_prefix_identical(name: &str, truncated: &[f64], full: &[f64]) {
    for (i, (t, f)) in truncated.iter().zip(full).enumerate() {
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert_eq!(
            t.to_bits(),
            f.to_bits(),
            "{name}: look-ahead at bar {i} (truncated={t}, full={f})"
        );
    }
}

#[test]
fn sar_series_has_no_lookahead() {
    let bars = make_test_bars(300);
    let params = SarParams::default();
    let full = compute(&bars, &params).unwrap();

    for k in [2, 3, 10, 57, 150, 299] {
        let truncated = compute(&bars[..k], &params).unwrap();
        assert_eq!(truncated.len(), k);
        assert_eq!(truncated.points(), &full.points()[..k], "prefix of length {k}");
    }
}

#[test]
fn sar_state_trace_has_no_lookahead() {
    let bars = make_test_bars(200);
    let params = SarParams::new(0.01, 0.01, 0.1).unwrap();
    let (_, full) = compute_with_states(&bars, &params).unwrap();
    let (_, truncated) = compute_with_states(&bars[..120], &params).unwrap();
    assert_eq!(truncated, full[..120].to_vec());
}

#[test]
fn indicator_seam_has_no_lookahead() {
    let bars = make_test_bars(200);
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(ParabolicSar::new(SarParams::default()).unwrap()),
        Box::new(Atr::new(14)),
    ];
    for ind in &indicators {
        let full = ind.values(&bars);
        let truncated = ind.values(&bars[..100]);
        assert_eq!(full.len(), 200);
        assert_eq!(truncated.len(), 100);
        assert_prefix_identical(ind.name(), &truncated, &full);
    }
}

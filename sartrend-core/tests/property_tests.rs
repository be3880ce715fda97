//! Property tests for SAR engine invariants.
//!
//! Uses proptest to verify, over arbitrary well-formed bar series:
//! 1. Determinism and length preservation
//! 2. Trend bracket: Rising SAR never above this or the previous low,
//!    Falling SAR never below this or the previous high
//! 3. Acceleration factor stays within [af_start, af_maximum]
//! 4. Extreme point ratchets monotonically within a trend run
//! 5. A reversal resets the acceleration factor
//! 6. The classifier is total

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use sartrend_core::domain::PriceBar;
use sartrend_core::indicators::{compute, compute_with_states, SarParams, Trend};
use sartrend_core::signal::{classify, Signal};

// ── Strategies (proptest) ────────────────────────────────────────────

/// (mid, half-range) pairs become bars with low = mid - range, high = mid + range.
fn arb_bars() -> impl Strategy<Value = Vec<PriceBar>> {
    prop::collection::vec((1.0..500.0_f64, 0.0..20.0_f64, 0.0..1.0_f64), 2..120).prop_map(|raw| {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        raw.into_iter()
            .enumerate()
            .map(|(i, (mid, half, pos))| {
                let low = mid;
                let high = mid + half;
                let close = low + (high - low) * pos;
                PriceBar::new(t0 + chrono::Duration::minutes(15 * i as i64), low, high, low, close)
            })
            .collect()
    })
}

fn arb_params() -> impl Strategy<Value = SarParams> {
    (0.001..0.1_f64, 0.001..0.1_f64, 0.0..0.5_f64).prop_map(|(start, inc, extra)| {
        SarParams::new(start, inc, start + extra).unwrap()
    })
}

fn arb_trend() -> impl Strategy<Value = Trend> {
    prop_oneof![Just(Trend::Rising), Just(Trend::Falling)]
}

// ── 1. Determinism / length ──────────────────────────────────────────

proptest! {
    #[test]
    fn deterministic_and_length_preserving(bars in arb_bars(), params in arb_params()) {
        let a = compute(&bars, &params).unwrap();
        let b = compute(&bars, &params).unwrap();
        prop_assert_eq!(a.len(), bars.len());
        prop_assert_eq!(a, b);
    }
}

// ── 2. Trend bracket ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn sar_brackets_price(bars in arb_bars(), params in arb_params()) {
        let series = compute(&bars, &params).unwrap();
        for i in 1..bars.len() {
            let p = series.get(i).unwrap();
            match p.trend {
                Trend::Rising => {
                    let bound = bars[i].low.min(bars[i - 1].low);
                    prop_assert!(p.value <= bound, "bar {}: rising sar {} > {}", i, p.value, bound);
                }
                Trend::Falling => {
                    let bound = bars[i].high.max(bars[i - 1].high);
                    prop_assert!(p.value >= bound, "bar {}: falling sar {} < {}", i, p.value, bound);
                }
            }
        }
    }
}

// ── 3–5. Engine state ────────────────────────────────────────────────

proptest! {
    #[test]
    fn af_stays_in_bounds(bars in arb_bars(), params in arb_params()) {
        let (_, states) = compute_with_states(&bars, &params).unwrap();
        for s in &states {
            prop_assert!(s.acceleration_factor >= params.af_start);
            prop_assert!(s.acceleration_factor <= params.af_maximum);
        }
    }

    #[test]
    fn extreme_point_ratchets_within_a_run(bars in arb_bars(), params in arb_params()) {
        let (_, states) = compute_with_states(&bars, &params).unwrap();
        for w in states.windows(2) {
            if w[0].trend != w[1].trend {
                continue;
            }
            match w[1].trend {
                Trend::Rising => prop_assert!(w[1].extreme_point >= w[0].extreme_point),
                Trend::Falling => prop_assert!(w[1].extreme_point <= w[0].extreme_point),
            }
        }
    }

    #[test]
    fn reversal_resets_af(bars in arb_bars(), params in arb_params()) {
        let (series, states) = compute_with_states(&bars, &params).unwrap();
        for i in series.reversals() {
            prop_assert_eq!(states[i].acceleration_factor, params.af_start);
        }
    }
}

// ── 6. Classifier totality ───────────────────────────────────────────

proptest! {
    #[test]
    fn classify_is_total(price in any::<f64>(), sar in any::<f64>(), trend in arb_trend()) {
        let s = classify(price, sar, trend);
        prop_assert!(matches!(s, Signal::Buy | Signal::Sell | Signal::Hold));
        if s == Signal::Buy {
            prop_assert_eq!(trend, Trend::Rising);
        }
        if s == Signal::Sell {
            prop_assert_eq!(trend, Trend::Falling);
        }
    }
}

//! Parabolic SAR — Wilder's stop-and-reverse recurrence.
//!
//! Inherently sequential/stateful: maintains trend, extreme point (EP),
//! and acceleration factor (AF). This module is the only implementation of
//! the recurrence in the workspace; strategies, the runner and the CLI all
//! read SAR values from here.
//!
//! Rule set:
//! - Seed on bar 0 from the first two closes: `close[1] > close[0]` seeds
//!   Rising with SAR = low[0], EP = high[0]; anything else seeds Falling with
//!   SAR = high[0], EP = low[0].
//! - Each later bar: project `sar + af * (ep - sar)`, clamp against the
//!   preceding bar's low (Rising) or high (Falling), ratchet EP/AF on a new
//!   extreme, then reverse if the bar strictly penetrates the SAR.
//! - On reversal the abandoned EP becomes the SAR, the flipping bar's
//!   opposite extreme becomes the new EP, and AF resets to `af_start`.
//!
//! Parameters: af_start (default 0.02), af_increment (default 0.02),
//! af_maximum (default 0.20). Needs at least 2 bars.

use super::Indicator;
use crate::domain::PriceBar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of bars `compute` accepts.
pub const MIN_BARS: usize = 2;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SarError {
    #[error("insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("invalid SAR parameters: {0}")]
    InvalidParams(String),
}

/// Acceleration-factor schedule. Immutable once validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SarParams {
    pub af_start: f64,
    pub af_increment: f64,
    pub af_maximum: f64,
}

impl Default for SarParams {
    fn default() -> Self {
        Self {
            af_start: 0.02,
            af_increment: 0.02,
            af_maximum: 0.2,
        }
    }
}

impl SarParams {
    pub fn new(af_start: f64, af_increment: f64, af_maximum: f64) -> Result<Self, SarError> {
        let params = Self {
            af_start,
            af_increment,
            af_maximum,
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks `0 < af_start <= af_maximum`, `af_increment > 0`, all finite.
    pub fn validate(&self) -> Result<(), SarError> {
        let all_finite =
            self.af_start.is_finite() && self.af_increment.is_finite() && self.af_maximum.is_finite();
        if !all_finite {
            return Err(SarError::InvalidParams(format!(
                "parameters must be finite (start={}, increment={}, maximum={})",
                self.af_start, self.af_increment, self.af_maximum
            )));
        }
        if self.af_start <= 0.0 {
            return Err(SarError::InvalidParams(format!(
                "af_start must be > 0, got {}",
                self.af_start
            )));
        }
        if self.af_increment <= 0.0 {
            return Err(SarError::InvalidParams(format!(
                "af_increment must be > 0, got {}",
                self.af_increment
            )));
        }
        if self.af_maximum < self.af_start {
            return Err(SarError::InvalidParams(format!(
                "af_maximum ({}) must be >= af_start ({})",
                self.af_maximum, self.af_start
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
}

impl Trend {
    pub fn is_rising(self) -> bool {
        matches!(self, Self::Rising)
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Rising => Self::Falling,
            Self::Falling => Self::Rising,
        }
    }
}

/// SAR level and the trend in effect at one bar, after any reversal on that bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SarPoint {
    pub value: f64,
    pub trend: Trend,
}

/// Recurrence state carried from one bar to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SarState {
    pub trend: Trend,
    pub acceleration_factor: f64,
    pub extreme_point: f64,
    pub sar: f64,
}

/// One SAR point per input bar, in input order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SarSeries {
    points: Vec<SarPoint>,
}

impl SarSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SarPoint> {
        self.points.get(index)
    }

    pub fn last(&self) -> Option<&SarPoint> {
        self.points.last()
    }

    pub fn points(&self) -> &[SarPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &SarPoint> {
        self.points.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn trends(&self) -> Vec<Trend> {
        self.points.iter().map(|p| p.trend).collect()
    }

    /// Indices of bars whose trend differs from the previous bar's.
    pub fn reversals(&self) -> Vec<usize> {
        self.points
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0].trend != w[1].trend)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// True if the trend flipped on bar `index`.
    pub fn is_reversal(&self, index: usize) -> bool {
        index > 0
            && matches!(
                (self.points.get(index - 1), self.points.get(index)),
                (Some(prev), Some(cur)) if prev.trend != cur.trend
            )
    }
}

impl From<Vec<SarPoint>> for SarSeries {
    fn from(points: Vec<SarPoint>) -> Self {
        Self { points }
    }
}

/// Step-wise SAR engine. Owns its state exclusively.
///
/// ```
/// use sartrend_core::indicators::{SarParams, SarRecurrence};
/// use sartrend_core::domain::PriceBar;
/// use chrono::Utc;
///
/// let t = Utc::now();
/// let b0 = PriceBar::new(t, 9.5, 10.0, 9.0, 9.5);
/// let b1 = PriceBar::new(t, 10.5, 11.0, 10.0, 10.5);
/// let (mut rec, seed) = SarRecurrence::seed(SarParams::default(), &b0, &b1).unwrap();
/// assert_eq!(seed.value, 9.0);
/// let p1 = rec.step(&b1).unwrap();
/// assert!(p1.trend.is_rising());
/// ```
#[derive(Debug, Clone)]
pub struct SarRecurrence {
    params: SarParams,
    state: SarState,
    prev_high: f64,
    prev_low: f64,
    index: usize,
}

impl SarRecurrence {
    /// Seed the recurrence on `first`, using `second` only to pick the
    /// initial trend. Returns the engine and the point for `first`.
    pub fn seed(
        params: SarParams,
        first: &PriceBar,
        second: &PriceBar,
    ) -> Result<(Self, SarPoint), SarError> {
        params.validate()?;
        check_bar(0, first)?;
        check_bar(1, second)?;

        let state = if second.close > first.close {
            SarState {
                trend: Trend::Rising,
                acceleration_factor: params.af_start,
                extreme_point: first.high,
                sar: first.low,
            }
        } else {
            SarState {
                trend: Trend::Falling,
                acceleration_factor: params.af_start,
                extreme_point: first.low,
                sar: first.high,
            }
        };

        let rec = Self {
            params,
            state,
            prev_high: first.high,
            prev_low: first.low,
            index: 0,
        };
        let point = rec.point();
        Ok((rec, point))
    }

    /// Advance one bar and return its point.
    ///
    /// A bar that fails validation is rejected without touching the state.
    pub fn step(&mut self, bar: &PriceBar) -> Result<SarPoint, SarError> {
        let index = self.index + 1;
        check_bar(index, bar)?;

        let p = self.params;
        let s = &mut self.state;

        let mut sar = s.sar + s.acceleration_factor * (s.extreme_point - s.sar);

        match s.trend {
            Trend::Rising => {
                sar = sar.min(self.prev_low);
                if bar.high > s.extreme_point {
                    s.extreme_point = bar.high;
                    s.acceleration_factor = (s.acceleration_factor + p.af_increment).min(p.af_maximum);
                }
                if bar.low < sar {
                    s.trend = Trend::Falling;
                    sar = s.extreme_point;
                    s.extreme_point = bar.low;
                    s.acceleration_factor = p.af_start;
                }
            }
            Trend::Falling => {
                sar = sar.max(self.prev_high);
                if bar.low < s.extreme_point {
                    s.extreme_point = bar.low;
                    s.acceleration_factor = (s.acceleration_factor + p.af_increment).min(p.af_maximum);
                }
                if bar.high > sar {
                    s.trend = Trend::Rising;
                    sar = s.extreme_point;
                    s.extreme_point = bar.high;
                    s.acceleration_factor = p.af_start;
                }
            }
        }

        s.sar = sar;
        self.prev_high = bar.high;
        self.prev_low = bar.low;
        self.index = index;
        Ok(self.point())
    }

    pub fn state(&self) -> SarState {
        self.state
    }

    pub fn params(&self) -> &SarParams {
        &self.params
    }

    /// Index of the last bar consumed.
    pub fn index(&self) -> usize {
        self.index
    }

    fn point(&self) -> SarPoint {
        SarPoint {
            value: self.state.sar,
            trend: self.state.trend,
        }
    }
}

fn check_bar(index: usize, bar: &PriceBar) -> Result<(), SarError> {
    for (field, v) in [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
    ] {
        if !v.is_finite() {
            return Err(SarError::InvalidBar {
                index,
                reason: format!("{field} is not finite ({v})"),
            });
        }
    }
    if bar.high < bar.low {
        return Err(SarError::InvalidBar {
            index,
            reason: format!("high {} < low {}", bar.high, bar.low),
        });
    }
    Ok(())
}

fn check_input(bars: &[PriceBar], params: &SarParams) -> Result<(), SarError> {
    params.validate()?;
    if bars.len() < MIN_BARS {
        return Err(SarError::InsufficientData {
            required: MIN_BARS,
            actual: bars.len(),
        });
    }
    bars.iter()
        .enumerate()
        .try_for_each(|(i, bar)| check_bar(i, bar))
}

/// Compute the SAR series for `bars`.
///
/// All input is validated before any point is produced; on error nothing
/// is returned.
pub fn compute(bars: &[PriceBar], params: &SarParams) -> Result<SarSeries, SarError> {
    Ok(compute_with_states(bars, params)?.0)
}

/// Like [`compute`], also returning the recurrence state after every bar.
pub fn compute_with_states(
    bars: &[PriceBar],
    params: &SarParams,
) -> Result<(SarSeries, Vec<SarState>), SarError> {
    check_input(bars, params)?;

    let (mut rec, seed) = SarRecurrence::seed(*params, &bars[0], &bars[1])?;
    let mut points = Vec::with_capacity(bars.len());
    let mut states = Vec::with_capacity(bars.len());
    points.push(seed);
    states.push(rec.state());

    for bar in &bars[1..] {
        points.push(rec.step(bar)?);
        states.push(rec.state());
    }

    Ok((SarSeries::from(points), states))
}

/// SAR exposed through the single-series [`Indicator`] seam.
#[derive(Debug, Clone)]
pub struct ParabolicSar {
    params: SarParams,
    name: String,
}

impl ParabolicSar {
    pub fn new(params: SarParams) -> Result<Self, SarError> {
        params.validate()?;
        Ok(Self {
            name: format!(
                "psar_{}_{}_{}",
                params.af_start, params.af_increment, params.af_maximum
            ),
            params,
        })
    }

    pub fn params(&self) -> &SarParams {
        &self.params
    }
}

impl Indicator for ParabolicSar {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        // Bar 0 carries a seed value, but the trend needs bar 1 to be chosen.
        1
    }

    fn values(&self, bars: &[PriceBar]) -> Vec<f64> {
        match compute(bars, &self.params) {
            Ok(series) => series.values(),
            Err(_) => vec![f64::NAN; bars.len()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, make_hl_bars, DEFAULT_EPSILON};

    fn rising_run() -> Vec<(f64, f64)> {
        vec![(10.0, 9.0), (11.0, 10.0), (12.0, 11.0), (13.0, 12.0), (14.0, 13.0)]
    }

    #[test]
    fn monotonic_rise_stays_rising() {
        let bars = make_hl_bars(&rising_run());
        let series = compute(&bars, &SarParams::default()).unwrap();

        assert_eq!(series.len(), 5);
        assert!(series.trends().iter().all(|t| t.is_rising()));

        // Bar 1 is pinned to low[0] by the clamp; from there it rises strictly.
        let expected = [9.0, 9.0, 9.08, 9.2552, 9.554784];
        for (p, e) in series.iter().zip(expected) {
            assert_approx(p.value, e, DEFAULT_EPSILON);
        }
        let values = series.values();
        for i in 2..values.len() {
            assert!(values[i] > values[i - 1]);
        }
        for i in 1..bars.len() {
            assert!(values[i] <= bars[i - 1].low);
            assert!(values[i] < bars[i].close);
        }
    }

    #[test]
    fn sharp_reversal_flips_on_the_breaking_bar() {
        let mut pairs = rising_run();
        pairs.push((13.5, 8.0));
        let bars = make_hl_bars(&pairs);
        let (series, states) = compute_with_states(&bars, &SarParams::default()).unwrap();

        assert_eq!(series.reversals(), vec![5]);
        assert!(series.is_reversal(5));
        let flip = series.get(5).unwrap();
        assert_eq!(flip.trend, Trend::Falling);
        // The EP from the rising run (high of bar 4) becomes the SAR.
        assert_eq!(flip.value, 14.0);
        assert_eq!(states[5].acceleration_factor, 0.02);
        assert_eq!(states[5].extreme_point, 8.0);
        // AF had ratcheted to 0.10 before the break.
        assert_approx(states[4].acceleration_factor, 0.10, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_series_never_flips() {
        let bars = make_hl_bars(&[(100.0, 100.0); 2]);
        let series = compute(&bars, &SarParams::default()).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.reversals().is_empty());
        assert!(series.values().iter().all(|v| *v == 100.0));

        let longer = make_hl_bars(&[(100.0, 100.0); 20]);
        let series = compute(&longer, &SarParams::default()).unwrap();
        assert!(series.reversals().is_empty());
        assert!(series.values().iter().all(|v| *v == 100.0));
    }

    #[test]
    fn single_bar_is_insufficient() {
        let bars = make_hl_bars(&[(10.0, 9.0)]);
        let err = compute(&bars, &SarParams::default()).unwrap_err();
        assert_eq!(
            err,
            SarError::InsufficientData {
                required: 2,
                actual: 1
            }
        );
        assert!(matches!(
            compute(&[], &SarParams::default()),
            Err(SarError::InsufficientData { actual: 0, .. })
        ));
    }

    #[test]
    fn inverted_bar_fails_whole_call() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        bars[3].high = bars[3].low - 1.0;
        match compute(&bars, &SarParams::default()) {
            Err(SarError::InvalidBar { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected InvalidBar, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_bar_fails() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars[1].close = f64::NAN;
        let err = compute(&bars, &SarParams::default()).unwrap_err();
        assert!(matches!(err, SarError::InvalidBar { index: 1, .. }));
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let closes: Vec<f64> = (0..50)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let bars = make_bars(&closes);
        let a = compute(&bars, &SarParams::default()).unwrap();
        let b = compute(&bars, &SarParams::default()).unwrap();
        let bits = |s: &SarSeries| s.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(a.trends(), b.trends());
    }

    #[test]
    fn falling_seed_when_second_close_not_higher() {
        let bars = make_hl_bars(&[(14.0, 13.0), (13.0, 12.0), (12.0, 11.0)]);
        let series = compute(&bars, &SarParams::default()).unwrap();
        assert_eq!(series.get(0).unwrap().value, 14.0);
        assert!(series.trends().iter().all(|t| *t == Trend::Falling));
        // Clamp pins bar 1 at high[0].
        assert_eq!(series.get(1).unwrap().value, 14.0);
    }

    #[test]
    fn af_caps_at_maximum() {
        let pairs: Vec<(f64, f64)> = (0..30)
            .map(|i| (101.0 + i as f64, 99.5 + i as f64))
            .collect();
        let bars = make_hl_bars(&pairs);
        let params = SarParams::new(0.02, 0.02, 0.10).unwrap();
        let (_, states) = compute_with_states(&bars, &params).unwrap();
        assert!(states.iter().all(|s| s.acceleration_factor <= 0.10 + 1e-12));
        assert_approx(states.last().unwrap().acceleration_factor, 0.10, DEFAULT_EPSILON);
    }

    #[test]
    fn params_validation() {
        assert!(SarParams::new(0.0, 0.02, 0.2).is_err());
        assert!(SarParams::new(0.02, 0.0, 0.2).is_err());
        assert!(SarParams::new(0.3, 0.02, 0.2).is_err());
        assert!(SarParams::new(f64::NAN, 0.02, 0.2).is_err());
        assert!(SarParams::new(0.2, 0.02, 0.2).is_ok());
        assert_eq!(SarParams::default(), SarParams::new(0.02, 0.02, 0.2).unwrap());
    }

    #[test]
    fn invalid_params_rejected_by_compute() {
        let bars = make_bars(&[100.0, 101.0]);
        let params = SarParams {
            af_start: 0.5,
            af_increment: 0.02,
            af_maximum: 0.2,
        };
        assert!(matches!(
            compute(&bars, &params),
            Err(SarError::InvalidParams(_))
        ));
    }

    #[test]
    fn step_rejects_bad_bar_without_mutating() {
        let bars = make_hl_bars(&rising_run());
        let (mut rec, _) = SarRecurrence::seed(SarParams::default(), &bars[0], &bars[1]).unwrap();
        rec.step(&bars[1]).unwrap();
        let before = rec.state();

        let mut bad = bars[2].clone();
        bad.low = f64::INFINITY;
        assert!(matches!(
            rec.step(&bad),
            Err(SarError::InvalidBar { index: 2, .. })
        ));
        assert_eq!(rec.state(), before);
        assert_eq!(rec.index(), 1);
    }

    #[test]
    fn recurrence_matches_batch() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 50.0 + (i as f64 * 0.45).cos() * 4.0)
            .collect();
        let bars = make_bars(&closes);
        let batch = compute(&bars, &SarParams::default()).unwrap();

        let (mut rec, seed) = SarRecurrence::seed(SarParams::default(), &bars[0], &bars[1]).unwrap();
        let mut points = vec![seed];
        for bar in &bars[1..] {
            points.push(rec.step(bar).unwrap());
        }
        assert_eq!(SarSeries::from(points), batch);
    }

    #[test]
    fn indicator_seam() {
        let psar = ParabolicSar::new(SarParams::default()).unwrap();
        assert_eq!(psar.name(), "psar_0.02_0.02_0.2");
        assert_eq!(psar.lookback(), 1);

        let bars = make_hl_bars(&rising_run());
        assert_eq!(psar.values(&bars).len(), 5);

        let one = make_hl_bars(&[(10.0, 9.0)]);
        let out = psar.values(&one);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_nan());
    }
}

//! Aggregate candles into a coarser interval.
//!
//! Buckets are aligned to the Unix epoch, so a 1H bucket always starts on
//! the hour. Each bucket takes the first open, the highest high, the lowest
//! low, the last close and the summed volume of its members.

use super::DataError;
use crate::domain::{Interval, PriceBar};
use chrono::{DateTime, Utc};

/// Resample `bars` (at interval `from`) into `to`-interval bars.
///
/// With `completed_only`, buckets the input only partly covers are dropped:
/// a leading bucket whose first member starts after the bucket opens, and a
/// trailing bucket whose last member does not reach the end of the bucket.
///
/// Bucket volume is the sum of member volumes, or `None` if any member has
/// no volume.
pub fn resample(
    bars: &[PriceBar],
    from: Interval,
    to: Interval,
    completed_only: bool,
) -> Result<Vec<PriceBar>, DataError> {
    if to.minutes() < from.minutes() || to.minutes() % from.minutes() != 0 {
        return Err(DataError::Resample {
            from,
            to,
            reason: format!("{to} is not a whole multiple of {from}"),
        });
    }

    let mut out: Vec<PriceBar> = Vec::new();
    let mut first_member: Option<DateTime<Utc>> = None;
    let mut last_member: Option<DateTime<Utc>> = None;

    for bar in bars {
        let start = bucket_start(bar.timestamp, to);
        let open_bucket = out.last().map(|agg| agg.timestamp);
        if open_bucket.is_some_and(|t| t > start) {
            return Err(DataError::Resample {
                from,
                to,
                reason: format!("input not chronological at {}", bar.timestamp),
            });
        }
        match out.last_mut() {
            Some(agg) if open_bucket == Some(start) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume = match (agg.volume, bar.volume) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            }
            _ => out.push(PriceBar {
                timestamp: start,
                ..bar.clone()
            }),
        }
        first_member.get_or_insert(bar.timestamp);
        last_member = Some(bar.timestamp);
    }

    if completed_only {
        if let (Some(agg), Some(last)) = (out.last(), last_member) {
            if last + from.duration() < agg.timestamp + to.duration() {
                out.pop();
            }
        }
        if let (Some(agg), Some(first)) = (out.first(), first_member) {
            if agg.timestamp < first {
                out.remove(0);
            }
        }
    }

    Ok(out)
}

/// Bars of `interval` that have closed by `cutoff`.
///
/// `bars` must be chronological. A bar opened at `t` closes at
/// `t + interval`.
pub fn completed_by(bars: &[PriceBar], interval: Interval, cutoff: DateTime<Utc>) -> &[PriceBar] {
    let n = bars.partition_point(|b| b.timestamp + interval.duration() <= cutoff);
    &bars[..n]
}

fn bucket_start(ts: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let secs = interval.minutes() * 60;
    let start = ts.timestamp().div_euclid(secs) * secs;
    DateTime::from_timestamp(start, 0).unwrap_or(ts)
}

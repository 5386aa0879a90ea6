//! Fetch window planning and the post-fetch filter.

use crate::domain::{Bar, FilterThreshold, TimeframePolicy};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::Serialize;

/// Half-open `[start, end)` date range requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `start` was moved forward to the provider's lookback ceiling.
    pub clamped: bool,
}

/// Compute the window for one pair.
///
/// Cold fetch starts `lookback_days` before now; a resume starts
/// `overlap_days` before the cursor. Either way the start never precedes the
/// provider ceiling, and the end is always tomorrow so the in-progress
/// session is included.
pub fn plan_window(
    cursor: Option<DateTime<Tz>>,
    policy: &TimeframePolicy,
    now: DateTime<Tz>,
) -> FetchWindow {
    // Wall-clock arithmetic so a DST switch inside the window cannot move
    // the start across midnight.
    let now = now.naive_local();
    let mut start = match cursor {
        None => days_before(now, policy.lookback_days),
        Some(last) => days_before(last.naive_local(), policy.overlap_days),
    };

    let mut clamped = false;
    if let Some(max_days) = policy.provider_max_lookback_days {
        let ceiling = days_before(now, max_days);
        if start < ceiling {
            start = ceiling;
            clamped = true;
        }
    }

    FetchWindow {
        start: start.date(),
        end: now.date().succ_opt().unwrap_or(NaiveDate::MAX),
        clamped,
    }
}

/// `t` minus `days`, saturating at the earliest representable instant.
fn days_before(t: NaiveDateTime, days: i64) -> NaiveDateTime {
    Duration::try_days(days)
        .and_then(|d| t.checked_sub_signed(d))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Timestamp incoming rows must strictly exceed, if any.
pub fn filter_threshold(
    cursor: Option<DateTime<Tz>>,
    window: &FetchWindow,
    policy: &TimeframePolicy,
) -> Option<NaiveDateTime> {
    let last = cursor?;
    Some(match policy.filter_threshold {
        FilterThreshold::Cursor => last.naive_local(),
        FilterThreshold::WindowStart => window.start.and_time(NaiveTime::MIN),
    })
}

/// Keep only rows strictly after `threshold`.
pub fn retain_after(bars: Vec<Bar>, threshold: Option<NaiveDateTime>) -> Vec<Bar> {
    match threshold {
        None => bars,
        Some(t) => bars.into_iter().filter(|b| b.timestamp > t).collect(),
    }
}

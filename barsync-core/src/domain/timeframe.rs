//! Sampling intervals and the static per-timeframe policy table.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar sampling interval supported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "4h")]
    FourHour,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
}

impl Interval {
    /// Interval code understood by the chart API.
    pub fn provider_code(&self) -> &'static str {
        match self {
            Interval::FourHour => "4h",
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self, Interval::FourHour)
    }

    /// `strftime` pattern of the `Date` column.
    pub fn timestamp_format(&self) -> &'static str {
        if self.is_intraday() {
            "%Y-%m-%d %H:%M:%S"
        } else {
            "%Y-%m-%d"
        }
    }

    /// Parse a `Date` cell. Date-only intervals land on midnight.
    pub fn parse_timestamp(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if self.is_intraday() {
            NaiveDateTime::parse_from_str(raw, self.timestamp_format()).ok()
        } else {
            NaiveDate::parse_from_str(raw, self.timestamp_format())
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        }
    }

    pub fn format_timestamp(&self, ts: NaiveDateTime) -> String {
        ts.format(self.timestamp_format()).to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_code())
    }
}

/// Which timestamp incoming rows must strictly exceed to survive the
/// post-fetch filter when a cursor exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterThreshold {
    /// Last stored timestamp. Rows inside the overlap never replace stored ones.
    #[default]
    Cursor,
    /// Start of the fetch window. Overlap revisions reach the merge.
    WindowStart,
}

/// Static configuration for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframePolicy {
    /// File label, e.g. `daily_10y`.
    pub label: String,
    pub interval: Interval,
    /// History depth requested on a cold fetch.
    pub lookback_days: i64,
    /// Trailing history re-requested when data already exists.
    pub overlap_days: i64,
    /// Hard provider ceiling on how far back this interval can be requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_max_lookback_days: Option<i64>,
    #[serde(default)]
    pub filter_threshold: FilterThreshold,
}

impl TimeframePolicy {
    /// About ten years of daily bars, two days of overlap.
    pub fn daily_10y() -> Self {
        Self {
            label: "daily_10y".into(),
            interval: Interval::Daily,
            lookback_days: 3650,
            overlap_days: 2,
            provider_max_lookback_days: None,
            filter_threshold: FilterThreshold::Cursor,
        }
    }

    /// 4-hour bars; the provider only serves the last 729 days.
    pub fn four_hour_729d() -> Self {
        Self {
            label: "4h_729d".into(),
            interval: Interval::FourHour,
            lookback_days: 729,
            overlap_days: 1,
            provider_max_lookback_days: Some(729),
            filter_threshold: FilterThreshold::Cursor,
        }
    }

    pub fn weekly_10y() -> Self {
        Self {
            label: "weekly_10y".into(),
            interval: Interval::Weekly,
            lookback_days: 3650,
            overlap_days: 7,
            provider_max_lookback_days: None,
            filter_threshold: FilterThreshold::Cursor,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::daily_10y(), Self::four_hour_729d(), Self::weekly_10y()]
    }
}

//! Remote fetcher — one provider call per pair, normalized into [`Bar`]s.

use super::provider::{DataError, DataProvider, RawBar};
use crate::domain::{Bar, Interval};
use crate::reconcile::FetchWindow;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: DataError,
    },

    #[error("provider returned no rows for {start}..{end}")]
    Empty {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

/// Normalization applied to provider rows.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub tz: Tz,
    /// Exchange-local session open; 4-hour bars are aligned to it.
    pub session_open: NaiveTime,
    /// Scale OHLC by `adj_close / close` where available.
    pub adjusted: bool,
    pub round_decimals: Option<u32>,
}

pub struct Fetcher<'a> {
    provider: &'a dyn DataProvider,
    options: FetchOptions,
}

impl<'a> Fetcher<'a> {
    pub fn new(provider: &'a dyn DataProvider, options: FetchOptions) -> Self {
        Self { provider, options }
    }

    /// Fetch `window` and normalize. Rows with a missing value are dropped; an
    /// empty result is an error.
    pub fn fetch(
        &self,
        symbol: &str,
        window: &FetchWindow,
        interval: Interval,
    ) -> Result<Vec<Bar>, FetchError> {
        let raw = self
            .provider
            .fetch(symbol, window.start, window.end, interval)
            .map_err(|source| FetchError::Provider {
                provider: self.provider.name().to_string(),
                source,
            })?;

        if raw.is_empty() {
            return Err(FetchError::Empty {
                start: window.start,
                end: window.end,
            });
        }

        let total = raw.len();
        let bars: Vec<Bar> = raw
            .into_iter()
            .map(|r| normalize(r, interval, &self.options))
            .filter(|b| !b.is_void())
            .collect();

        if bars.len() < total {
            debug!(symbol, dropped = total - bars.len(), "dropped rows with missing values");
        }
        if bars.is_empty() {
            return Err(FetchError::Empty {
                start: window.start,
                end: window.end,
            });
        }
        Ok(bars)
    }
}

/// Convert one provider row into an exchange-local bar.
///
/// The provider stamps the still-forming bar with the latest trade time, so
/// every timestamp is snapped back to the start of its bar.
pub fn normalize(raw: RawBar, interval: Interval, options: &FetchOptions) -> Bar {
    let local = raw.time.with_timezone(&options.tz).naive_local();
    let timestamp = bar_start(local, interval, options.session_open);

    let mut bar = Bar {
        timestamp,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: raw.volume,
    };

    if options.adjusted {
        if let Some(adj) = raw.adj_close {
            if raw.close.is_finite() && raw.close != 0.0 && adj.is_finite() {
                bar = bar.scaled(adj / raw.close);
            }
        }
    }

    match options.round_decimals {
        Some(decimals) => bar.rounded(decimals),
        None => bar,
    }
}

/// Start of the bar containing `t`: session-aligned 4-hour block, midnight,
/// or Monday midnight.
fn bar_start(t: NaiveDateTime, interval: Interval, session_open: NaiveTime) -> NaiveDateTime {
    const BLOCK_MINUTES: i64 = 240;
    match interval {
        Interval::FourHour => {
            let anchor = t.date().and_time(session_open);
            let offset = (t - anchor).num_minutes().div_euclid(BLOCK_MINUTES) * BLOCK_MINUTES;
            anchor + Duration::minutes(offset)
        }
        Interval::Daily => t.date().and_time(NaiveTime::MIN),
        Interval::Weekly => {
            let back = i64::from(t.weekday().num_days_from_monday());
            (t.date() - Duration::days(back)).and_time(NaiveTime::MIN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::StaticProvider;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn options(adjusted: bool, round_decimals: Option<u32>) -> FetchOptions {
        FetchOptions {
            tz: chrono_tz::America::New_York,
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            adjusted,
            round_decimals,
        }
    }

    fn raw_at(h: u32, m: u32) -> RawBar {
        RawBar {
            time: Utc.with_ymd_and_hms(2024, 1, 10, h, m, 0).unwrap(),
            open: 100.123,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 1_500_000.0,
            adj_close: Some(50.5),
        }
    }

    #[test]
    fn daily_rows_land_on_exchange_midnight() {
        let bar = normalize(raw_at(14, 30), Interval::Daily, &options(false, None));
        assert_eq!(Interval::Daily.format_timestamp(bar.timestamp), "2024-01-10");
    }

    #[test]
    fn intraday_rows_keep_exchange_wall_clock() {
        let bar = normalize(raw_at(18, 30), Interval::FourHour, &options(false, None));
        assert_eq!(
            Interval::FourHour.format_timestamp(bar.timestamp),
            "2024-01-10 13:30:00"
        );
    }

    #[test]
    fn live_intraday_row_snaps_to_block_start() {
        // 11:07 ET, mid-way through the first block of the session.
        let bar = normalize(raw_at(16, 7), Interval::FourHour, &options(false, None));
        assert_eq!(
            Interval::FourHour.format_timestamp(bar.timestamp),
            "2024-01-10 09:30:00"
        );

        // 14:52 ET falls in the afternoon block.
        let bar = normalize(raw_at(19, 52), Interval::FourHour, &options(false, None));
        assert_eq!(
            Interval::FourHour.format_timestamp(bar.timestamp),
            "2024-01-10 13:30:00"
        );
    }

    #[test]
    fn weekly_row_snaps_to_monday() {
        // Wednesday 2024-01-10 during the session.
        let bar = normalize(raw_at(16, 7), Interval::Weekly, &options(false, None));
        assert_eq!(Interval::Weekly.format_timestamp(bar.timestamp), "2024-01-08");

        let monday = RawBar {
            time: Utc.with_ymd_and_hms(2024, 1, 8, 5, 0, 0).unwrap(),
            ..raw_at(0, 0)
        };
        let bar = normalize(monday, Interval::Weekly, &options(false, None));
        assert_eq!(Interval::Weekly.format_timestamp(bar.timestamp), "2024-01-08");
    }

    #[test]
    fn adjustment_scales_prices_not_volume() {
        let bar = normalize(raw_at(14, 30), Interval::Daily, &options(true, Some(2)));
        assert_eq!(bar.close, 50.5);
        assert_eq!(bar.high, 51.0);
        assert_eq!(bar.open, 50.06);
        assert_eq!(bar.volume, 1_500_000.0);
    }

    #[test]
    fn unadjusted_keeps_raw_prices() {
        let bar = normalize(raw_at(14, 30), Interval::Daily, &options(false, Some(2)));
        assert_eq!(bar.open, 100.12);
        assert_eq!(bar.close, 101.0);
    }

    #[test]
    fn empty_response_is_reported() {
        let provider = StaticProvider::new();
        let fetcher = Fetcher::new(&provider, options(false, None));
        let window = FetchWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            clamped: false,
        };
        let err = fetcher.fetch("QQQ", &window, Interval::Daily).unwrap_err();
        assert!(matches!(err, FetchError::Empty { .. }));
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let mut gap = raw_at(14, 30);
        gap.close = f64::NAN;
        gap.time = Utc.with_ymd_and_hms(2024, 1, 11, 14, 30, 0).unwrap();
        let provider = StaticProvider::new().with_series(
            "QQQ",
            Interval::Daily,
            vec![raw_at(14, 30), gap],
        );
        let fetcher = Fetcher::new(&provider, options(false, None));
        let window = FetchWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            clamped: false,
        };
        let bars = fetcher.fetch("QQQ", &window, Interval::Daily).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn provider_failure_is_wrapped() {
        let provider = StaticProvider::new().failing_for("QQQ");
        let fetcher = Fetcher::new(&provider, options(false, None));
        let window = FetchWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            clamped: false,
        };
        let err = fetcher.fetch("QQQ", &window, Interval::Daily).unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }));
    }
}

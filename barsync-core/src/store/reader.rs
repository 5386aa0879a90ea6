//! Local dataset reader — derives the reconciliation cursor for one pair.

use super::table::{read_table, LoadedTable, ReadError, MIN_TRUSTED_YEAR};
use crate::clock::MarketClock;
use crate::domain::{Interval, TimeframePolicy};
use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use std::path::Path;

/// What the local file says about the next fetch.
#[derive(Debug)]
pub enum CursorStatus {
    /// No file: cold fetch.
    Absent,
    /// File exists but cannot be trusted: cold fetch, existing content discarded.
    Corrupt { reason: ReadError },
    /// Already holds the latest bar the exchange could have produced: skip.
    UpToDate { last: DateTime<Tz> },
    /// Valid data that needs refreshing from `last`. Carries the loaded rows
    /// so the merge does not read the file a second time.
    Resume {
        last: DateTime<Tz>,
        table: LoadedTable,
    },
}

impl CursorStatus {
    /// Timestamp to resume from; `None` means cold fetch or skip.
    pub fn cursor(&self) -> Option<DateTime<Tz>> {
        match self {
            CursorStatus::Resume { last, .. } => Some(*last),
            _ => None,
        }
    }

    pub fn needs_fetch(&self) -> bool {
        !matches!(self, CursorStatus::UpToDate { .. })
    }

    /// Short label for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CursorStatus::Absent => "absent",
            CursorStatus::Corrupt { .. } => "corrupt",
            CursorStatus::UpToDate { .. } => "up_to_date",
            CursorStatus::Resume { .. } => "resume",
        }
    }
}

/// Inspect the file at `path` and decide how the pair should be refreshed.
///
/// Never fails: every read problem maps to `Absent` or `Corrupt`.
pub fn read_cursor(
    path: &Path,
    policy: &TimeframePolicy,
    clock: &dyn MarketClock,
) -> CursorStatus {
    let table = match read_table(path, policy.interval) {
        Ok(table) => table,
        Err(ReadError::Missing { .. }) => return CursorStatus::Absent,
        Err(reason) => return CursorStatus::Corrupt { reason },
    };

    let Some(last) = table.last_timestamp() else {
        return CursorStatus::Corrupt {
            reason: ReadError::NoValidRows {
                path: path.to_path_buf(),
            },
        };
    };

    if last.year() < MIN_TRUSTED_YEAR {
        return CursorStatus::Corrupt {
            reason: ReadError::SuspiciousDate {
                path: path.to_path_buf(),
                last,
            },
        };
    }

    let last = clock.localize(last);
    if is_up_to_date(last, policy.interval, clock) {
        CursorStatus::UpToDate { last }
    } else {
        CursorStatus::Resume { last, table }
    }
}

/// Whether `last` already reflects the newest bar available as of `clock.now()`.
///
/// Daily and weekly series are current once they hold today's date, or the
/// most recent trading day when today has no session. A 4-hour series holding
/// today is current only until today's session opens.
pub fn is_up_to_date(last: DateTime<Tz>, interval: Interval, clock: &dyn MarketClock) -> bool {
    let now = clock.now();
    let today = clock.today();
    let last_day = last.date_naive();

    if last_day > today {
        return true;
    }

    if interval.is_intraday() {
        return last_day == today
            && clock
                .session_open(today)
                .map_or(true, |open| now < open);
    }

    last_day == today
        || (!clock.is_trading_day(today) && last_day >= clock.previous_trading_day(today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::fs;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn write(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("series.csv");
        fs::write(&path, content).unwrap();
        path
    }

    const DAILY: &str = "Date,Open,High,Low,Close,Volume\n\
                         2024-01-09,99,100,98,99.5,900000\n\
                         2024-01-10,100,101,99,100.5,1000000\n";

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(
            &dir.path().join("none.csv"),
            &TimeframePolicy::daily_10y(),
            &clock,
        );
        assert!(matches!(status, CursorStatus::Absent));
        assert!(status.needs_fetch());
    }

    #[test]
    fn stale_daily_resumes_from_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), DAILY);
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);
        let last = status.cursor().expect("resume cursor");
        assert_eq!(last.naive_local(), local(2024, 1, 10, 0, 0));
    }

    #[test]
    fn resume_carries_the_loaded_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), DAILY);
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);

        // The file is gone; the merge must rely on what the reader kept.
        fs::remove_file(&path).unwrap();
        let CursorStatus::Resume { table, .. } = &status else {
            panic!("expected resume, got {}", status.kind());
        };
        assert_eq!(table.bars.len(), 2);
        assert_eq!(table.bars[1].timestamp, local(2024, 1, 10, 0, 0));
        assert_eq!(table.bars[1].close, 100.5);
    }

    #[test]
    fn daily_with_todays_bar_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), DAILY);
        let clock = FixedClock::us_equities_at(local(2024, 1, 10, 15, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);
        assert!(matches!(status, CursorStatus::UpToDate { .. }));
        assert!(status.cursor().is_none());
        assert!(!status.needs_fetch());
    }

    #[test]
    fn weekend_after_last_session_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Date,Open,High,Low,Close,Volume\n2024-01-12,1,1,1,1,1\n",
        );
        // Saturday
        let clock = FixedClock::us_equities_at(local(2024, 1, 13, 12, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);
        assert!(matches!(status, CursorStatus::UpToDate { .. }));
    }

    #[test]
    fn missing_column_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Date,Open,High,Low,Close\n2024-01-10,100,101,99,100.5\n",
        );
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);
        assert!(matches!(
            status,
            CursorStatus::Corrupt {
                reason: ReadError::MissingColumns { .. }
            }
        ));
    }

    #[test]
    fn ancient_last_date_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Date,Open,High,Low,Close,Volume\n1999-12-31,1,1,1,1,1\n",
        );
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(&path, &TimeframePolicy::daily_10y(), &clock);
        assert!(matches!(
            status,
            CursorStatus::Corrupt {
                reason: ReadError::SuspiciousDate { .. }
            }
        ));
    }

    #[test]
    fn daily_format_in_intraday_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), DAILY);
        let clock = FixedClock::us_equities_at(local(2024, 1, 12, 18, 0));
        let status = read_cursor(&path, &TimeframePolicy::four_hour_729d(), &clock);
        assert!(matches!(
            status,
            CursorStatus::Corrupt {
                reason: ReadError::NoValidRows { .. }
            }
        ));
    }

    #[test]
    fn intraday_today_is_current_only_before_open() {
        let last = FixedClock::us_equities_at(local(2024, 1, 10, 9, 30)).now();

        let before_open = FixedClock::us_equities_at(local(2024, 1, 10, 8, 0));
        assert!(!is_up_to_date(
            before_open.localize(local(2024, 1, 9, 13, 30)),
            Interval::FourHour,
            &before_open
        ));

        let pre_open_today = FixedClock::us_equities_at(local(2024, 1, 10, 9, 0));
        assert!(is_up_to_date(last, Interval::FourHour, &pre_open_today));

        let after_open = FixedClock::us_equities_at(local(2024, 1, 10, 10, 0));
        assert!(!is_up_to_date(last, Interval::FourHour, &after_open));
    }
}

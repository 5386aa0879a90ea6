//! Market clock — "now", session opens and trading days in the exchange zone.
//!
//! Freshness checks never call the wall clock directly; they go through
//! [`MarketClock`] so tests can pin the instant with [`FixedClock`].

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

/// Exchange calendar capability.
pub trait MarketClock: Send + Sync {
    /// Exchange time zone.
    fn timezone(&self) -> Tz;

    /// Current instant in the exchange zone.
    fn now(&self) -> DateTime<Tz>;

    /// Regular-session open on `date`, if the exchange trades that day.
    fn session_open(&self, date: NaiveDate) -> Option<DateTime<Tz>>;

    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Exchange-local calendar date of `now()`.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Most recent trading day strictly before `date`.
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date - Duration::days(1);
        // A week always contains a trading day unless the calendar is empty.
        for _ in 0..14 {
            if self.is_trading_day(day) {
                return day;
            }
            day = day - Duration::days(1);
        }
        day
    }

    /// Attach the exchange zone to a naive exchange-local timestamp.
    fn localize(&self, ts: NaiveDateTime) -> DateTime<Tz> {
        let tz = self.timezone();
        tz.from_local_datetime(&ts)
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&ts))
    }
}

/// Weekday calendar with a fixed session open. Holidays are not modeled.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeClock {
    tz: Tz,
    session_open: NaiveTime,
}

impl ExchangeClock {
    pub fn new(tz: Tz, session_open: NaiveTime) -> Self {
        Self { tz, session_open }
    }

    /// US equities: America/New_York, 09:30 open.
    pub fn us_equities() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
        )
    }
}

impl MarketClock for ExchangeClock {
    fn timezone(&self) -> Tz {
        self.tz
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn session_open(&self, date: NaiveDate) -> Option<DateTime<Tz>> {
        if !self.is_trading_day(date) {
            return None;
        }
        self.tz
            .from_local_datetime(&date.and_time(self.session_open))
            .earliest()
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Exchange calendar pinned to a fixed "now".
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    exchange: ExchangeClock,
    now: DateTime<Tz>,
}

impl FixedClock {
    pub fn new(exchange: ExchangeClock, now: DateTime<Tz>) -> Self {
        Self { exchange, now }
    }

    /// US equities calendar frozen at a New York wall-clock time.
    pub fn us_equities_at(local: NaiveDateTime) -> Self {
        let exchange = ExchangeClock::us_equities();
        let now = exchange.localize(local);
        Self::new(exchange, now)
    }
}

impl MarketClock for FixedClock {
    fn timezone(&self) -> Tz {
        self.exchange.timezone()
    }

    fn now(&self) -> DateTime<Tz> {
        self.now
    }

    fn session_open(&self, date: NaiveDate) -> Option<DateTime<Tz>> {
        self.exchange.session_open(date)
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.exchange.is_trading_day(date)
    }
}

//! Bar — one OHLCV row of a series table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar for one timestamp.
///
/// `timestamp` is naive wall-clock time in the exchange time zone. Daily and
/// weekly bars sit at midnight; 4-hour bars carry the bar's start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Round all five value fields to `decimals` places.
    pub fn rounded(mut self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        let round = |v: f64| (v * factor).round() / factor;
        self.open = round(self.open);
        self.high = round(self.high);
        self.low = round(self.low);
        self.close = round(self.close);
        self.volume = round(self.volume);
        self
    }

    /// Scale OHLC by `ratio`; volume is left untouched.
    pub fn scaled(mut self, ratio: f64) -> Self {
        self.open *= ratio;
        self.high *= ratio;
        self.low *= ratio;
        self.close *= ratio;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 100.004,
            high: 101.456,
            low: 98.995,
            close: 100.5,
            volume: 1_000_000.0,
        }
    }

    #[test]
    fn rounding_uses_fixed_precision() {
        let bar = sample_bar().rounded(2);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 101.46);
        assert_eq!(bar.low, 99.0);
        assert_eq!(bar.close, 100.5);
        assert_eq!(bar.volume, 1_000_000.0);
    }

    #[test]
    fn scaling_leaves_volume_alone() {
        let bar = sample_bar().scaled(0.5);
        assert_eq!(bar.close, 50.25);
        assert_eq!(bar.volume, 1_000_000.0);
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        assert!(!bar.is_void());
        bar.close = f64::NAN;
        assert!(bar.is_void());
    }
}

//! Run configuration — symbols, storage layout, timeframe policies.
//!
//! Stored as TOML and loaded once per run. The loaded [`SyncConfig`] is
//! immutable and handed to the orchestrator by reference.

use crate::clock::ExchangeClock;
use crate::domain::{Interval, TimeframePolicy};
use crate::store::TableFormat;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Nested layout: one directory per symbol.
pub const NESTED_TEMPLATE: &str = "{root}/{symbol}/{symbol}_{label}.csv";

/// Flat layout: every file directly under the output root.
pub const FLAT_TEMPLATE: &str = "{root}/{symbol}_{label}.csv";

/// Upper bound on any day count in a timeframe policy (about a century).
pub const MAX_POLICY_DAYS: i64 = 36_500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown time zone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Exchange calendar settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    pub session_open: NaiveTime,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".into(),
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Complete, immutable configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub symbols: Vec<String>,
    pub output_root: PathBuf,
    #[serde(default = "default_path_template")]
    pub path_template: String,
    /// Scale OHLC for splits and dividends.
    #[serde(default = "default_adjusted")]
    pub adjusted: bool,
    /// Round fetched values and fix the written precision. Omitting the key
    /// in TOML disables rounding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_decimals: Option<u32>,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    pub timeframes: Vec<TimeframePolicy>,
}

fn default_path_template() -> String {
    NESTED_TEMPLATE.to_string()
}

fn default_adjusted() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["QQQ".into(), "AAPL".into(), "MSFT".into()],
            output_root: PathBuf::from("stock_data"),
            path_template: default_path_template(),
            adjusted: true,
            round_decimals: Some(2),
            exchange: ExchangeConfig::default(),
            timeframes: TimeframePolicy::defaults(),
        }
    }
}

impl SyncConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols configured".into()));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("blank symbol".into()));
        }
        // File names use the trimmed, lower-cased symbol.
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol.trim().to_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "symbol '{symbol}' is listed more than once"
                )));
            }
        }
        if self.timeframes.is_empty() {
            return Err(ConfigError::Invalid("no timeframes configured".into()));
        }

        let mut labels = HashSet::new();
        for policy in &self.timeframes {
            if !labels.insert(policy.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate timeframe label '{}'",
                    policy.label
                )));
            }
            if !(1..=MAX_POLICY_DAYS).contains(&policy.lookback_days)
                || !(0..=MAX_POLICY_DAYS).contains(&policy.overlap_days)
            {
                return Err(ConfigError::Invalid(format!(
                    "timeframe '{}': lookback must be 1..={MAX_POLICY_DAYS} days \
                     and overlap 0..={MAX_POLICY_DAYS}",
                    policy.label
                )));
            }
            let ceiling_ok = policy
                .provider_max_lookback_days
                .map_or(true, |d| (1..=MAX_POLICY_DAYS).contains(&d));
            if !ceiling_ok {
                return Err(ConfigError::Invalid(format!(
                    "timeframe '{}': provider_max_lookback_days must be 1..={MAX_POLICY_DAYS}",
                    policy.label
                )));
            }
        }

        // Without both placeholders two pairs would share one file.
        for placeholder in ["{symbol}", "{label}"] {
            if !self.path_template.contains(placeholder) {
                return Err(ConfigError::Invalid(format!(
                    "path_template must contain {placeholder}"
                )));
            }
        }

        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.exchange
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.exchange.timezone.clone()))
    }

    /// Exchange calendar built from the `[exchange]` table.
    pub fn clock(&self) -> Result<ExchangeClock, ConfigError> {
        Ok(ExchangeClock::new(self.timezone()?, self.exchange.session_open))
    }

    /// File holding the series for one (symbol, timeframe) pair.
    pub fn series_path(&self, symbol: &str, policy: &TimeframePolicy) -> PathBuf {
        let root = self.output_root.to_string_lossy();
        let rendered = self
            .path_template
            .replace("{root}", root.trim_end_matches(['/', '\\']))
            .replace("{symbol}", &symbol.trim().to_lowercase())
            .replace("{label}", &policy.label);
        PathBuf::from(rendered)
    }

    /// On-disk formatting for a given interval.
    pub fn table_format(&self, interval: Interval) -> TableFormat {
        TableFormat {
            interval,
            decimals: self.round_decimals,
        }
    }
}

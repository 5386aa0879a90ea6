//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over the remote market-data source so the
//! reconciler can run against Yahoo Finance in production and an in-memory
//! provider in tests.

use crate::domain::Interval;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// One provider row before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    /// Bar start instant.
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Split/dividend adjusted close, when the provider supplies one.
    pub adj_close: Option<f64>,
}

/// Structured error types for provider calls.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider refused the request (HTTP {status})")]
    Forbidden { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Remote fetch capability.
///
/// `start` is inclusive and `end` exclusive, both exchange-local dates.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<RawBar>, DataError>;
}

/// A recorded `fetch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

/// In-memory provider serving canned rows and recording every request.
///
/// Rows are returned when their UTC date falls inside the requested window.
#[derive(Debug, Default)]
pub struct StaticProvider {
    series: HashMap<(String, Interval), Vec<RawBar>>,
    failing: Vec<String>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, interval: Interval, bars: Vec<RawBar>) -> Self {
        self.series.insert((symbol.to_string(), interval), bars);
        self
    }

    /// Every fetch for `symbol` fails with a network error.
    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }

    /// Replace the canned rows for one series.
    pub fn set_series(&mut self, symbol: &str, interval: Interval, bars: Vec<RawBar>) {
        self.series.insert((symbol.to_string(), interval), bars);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<RawBar>, DataError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(FetchRequest {
                symbol: symbol.to_string(),
                start,
                end,
                interval,
            });
        }

        if self.failing.iter().any(|s| s == symbol) {
            return Err(DataError::NetworkUnreachable(format!(
                "static provider configured to fail for {symbol}"
            )));
        }

        Ok(self
            .series
            .get(&(symbol.to_string(), interval))
            .map(|bars| {
                bars.iter()
                    .filter(|b| {
                        let day = b.time.date_naive();
                        day >= start && day < end
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

//! Orchestrator — runs the reconcile pipeline for every (symbol, timeframe) pair.
//!
//! Pairs are processed sequentially and independently. Every failure is
//! caught per pair and turned into a [`PairOutcome`]; a run never aborts.

use crate::clock::MarketClock;
use crate::config::SyncConfig;
use crate::data::{DataProvider, FetchOptions, Fetcher};
use crate::domain::TimeframePolicy;
use crate::reconcile::{filter_threshold, merge_bars, plan_window, retain_after, MergeOutcome};
use crate::store::{persist, read_cursor, CursorStatus, PersistReport};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to one pair during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    /// The table was rewritten.
    Written {
        report: PersistReport,
        /// No trustworthy local data existed before this run.
        cold: bool,
        /// Existing rows could not be merged; only the fetched rows were written.
        merge_degraded: bool,
        duplicates_removed: usize,
    },
    /// Local data already covers the latest session; nothing fetched.
    UpToDate { last: NaiveDateTime },
    /// Fetch succeeded but nothing survived the post-fetch filter.
    NoNewData,
    FetchFailed { error: String },
    PersistFailed { error: String },
}

impl PairOutcome {
    /// Whether this pair should count against a strict run.
    pub fn is_failure(&self) -> bool {
        match self {
            PairOutcome::FetchFailed { .. } | PairOutcome::PersistFailed { .. } => true,
            PairOutcome::Written { report, .. } => !report.verified(),
            PairOutcome::UpToDate { .. } | PairOutcome::NoNewData => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairResult {
    pub symbol: String,
    pub timeframe: String,
    pub path: PathBuf,
    pub outcome: PairOutcome,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub written: usize,
    pub up_to_date: usize,
    pub no_new_data: usize,
    pub failed: usize,
    pub results: Vec<PairResult>,
}

impl SyncSummary {
    fn from_results(results: Vec<PairResult>) -> Self {
        let mut summary = SyncSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in &results {
            match result.outcome {
                PairOutcome::Written { .. } => summary.written += 1,
                PairOutcome::UpToDate { .. } => summary.up_to_date += 1,
                PairOutcome::NoNewData => summary.no_new_data += 1,
                _ => {}
            }
            if result.outcome.is_failure() {
                summary.failed += 1;
            }
        }
        summary.results = results;
        summary
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }
}

/// Local cursor state of one pair, as reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct PairStatus {
    pub symbol: String,
    pub timeframe: String,
    pub path: PathBuf,
    pub state: &'static str,
    pub last: Option<NaiveDateTime>,
    pub detail: Option<String>,
}

/// Progress callbacks for pair-by-pair runs.
pub trait SyncProgress {
    fn on_pair_start(&self, _symbol: &str, _timeframe: &str, _index: usize, _total: usize) {}
    fn on_pair_complete(&self, _result: &PairResult, _index: usize, _total: usize) {}
}

/// Progress sink that reports nothing.
pub struct NoProgress;

impl SyncProgress for NoProgress {}

/// Runs the pipeline against one configuration, provider and clock.
pub struct Synchronizer<'a> {
    config: &'a SyncConfig,
    provider: &'a dyn DataProvider,
    clock: &'a dyn MarketClock,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        config: &'a SyncConfig,
        provider: &'a dyn DataProvider,
        clock: &'a dyn MarketClock,
    ) -> Self {
        Self {
            config,
            provider,
            clock,
        }
    }

    pub fn run(&self) -> SyncSummary {
        self.run_with_progress(&NoProgress)
    }

    /// Process every pair in config order.
    pub fn run_with_progress(&self, progress: &dyn SyncProgress) -> SyncSummary {
        let total = self.config.symbols.len() * self.config.timeframes.len();
        let mut results = Vec::with_capacity(total);

        for symbol in &self.config.symbols {
            for policy in &self.config.timeframes {
                let index = results.len();
                progress.on_pair_start(symbol, &policy.label, index, total);

                let path = self.config.series_path(symbol, policy);
                let outcome = self.sync_pair(symbol, policy, &path);
                let result = PairResult {
                    symbol: symbol.clone(),
                    timeframe: policy.label.clone(),
                    path,
                    outcome,
                };

                progress.on_pair_complete(&result, index, total);
                results.push(result);
            }
        }

        let summary = SyncSummary::from_results(results);
        info!(
            total = summary.total,
            written = summary.written,
            up_to_date = summary.up_to_date,
            no_new_data = summary.no_new_data,
            failed = summary.failed,
            "sync finished"
        );
        summary
    }

    /// Reader → window → fetch → filter → merge → persist for one pair.
    pub fn sync_pair(&self, symbol: &str, policy: &TimeframePolicy, path: &Path) -> PairOutcome {
        let timeframe = policy.label.as_str();
        let status = read_cursor(path, policy, self.clock);

        match &status {
            CursorStatus::Absent => {
                info!(symbol, timeframe, path = %path.display(), "no local data, downloading full history");
            }
            CursorStatus::Corrupt { reason } => {
                warn!(
                    symbol, timeframe, path = %path.display(), error = %reason,
                    "local data unusable, re-downloading and overwriting"
                );
            }
            CursorStatus::UpToDate { last } => {
                info!(symbol, timeframe, path = %path.display(), last = %last, "up to date, skipping");
                return PairOutcome::UpToDate {
                    last: last.naive_local(),
                };
            }
            CursorStatus::Resume { last, .. } => {
                debug!(symbol, timeframe, path = %path.display(), last = %last, "resuming from cursor");
            }
        }

        let cursor = status.cursor();
        let window = plan_window(cursor, policy, self.clock.now());
        if window.clamped {
            warn!(
                symbol, timeframe, start = %window.start,
                max_days = ?policy.provider_max_lookback_days,
                "window start clamped to provider lookback limit"
            );
        }

        let fetcher = Fetcher::new(
            self.provider,
            FetchOptions {
                tz: self.clock.timezone(),
                session_open: self.config.exchange.session_open,
                adjusted: self.config.adjusted,
                round_decimals: self.config.round_decimals,
            },
        );
        let fetched = match fetcher.fetch(symbol, &window, policy.interval) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol, timeframe, error = %e, "fetch failed, skipping until next run");
                return PairOutcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        let fetched_rows = fetched.len();
        let incoming = retain_after(fetched, filter_threshold(cursor, &window, policy));
        if incoming.is_empty() {
            info!(symbol, timeframe, fetched_rows, "no rows newer than local data, skipping");
            return PairOutcome::NoNewData;
        }

        let existing = match status {
            CursorStatus::Resume { table, .. } => table.bars,
            _ => Vec::new(),
        };

        let mut merge_degraded = false;

        let merged = match merge_bars(&existing, &incoming) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(symbol, timeframe, error = %e, "merge failed, keeping only fetched rows");
                merge_degraded = true;
                MergeOutcome::new_only(incoming)
            }
        };
        let rows_before = if merge_degraded { 0 } else { existing.len() };

        let format = self.config.table_format(policy.interval);
        match persist(&merged.bars, path, rows_before, format) {
            Ok(report) => {
                match &report.verify_error {
                    None => info!(
                        symbol, timeframe, path = %path.display(),
                        rows = report.rows_after, new_rows = report.new_rows(),
                        last = ?report.last_timestamp,
                        "saved"
                    ),
                    Some(err) => warn!(
                        symbol, timeframe, path = %path.display(), error = %err,
                        "saved but verification failed"
                    ),
                }
                PairOutcome::Written {
                    report,
                    cold: cursor.is_none(),
                    merge_degraded,
                    duplicates_removed: merged.duplicates_removed,
                }
            }
            Err(e) => {
                warn!(symbol, timeframe, path = %path.display(), error = %e, "save failed, skipping");
                PairOutcome::PersistFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Cursor state of every configured pair, without touching the network.
pub fn pair_status(config: &SyncConfig, clock: &dyn MarketClock) -> Vec<PairStatus> {
    let mut out = Vec::new();
    for symbol in &config.symbols {
        for policy in &config.timeframes {
            let path = config.series_path(symbol, policy);
            let status = read_cursor(&path, policy, clock);
            let (last, detail) = match &status {
                CursorStatus::Absent => (None, None),
                CursorStatus::Corrupt { reason } => (None, Some(reason.to_string())),
                CursorStatus::UpToDate { last } | CursorStatus::Resume { last, .. } => {
                    (Some(last.naive_local()), None)
                }
            };
            out.push(PairStatus {
                symbol: symbol.clone(),
                timeframe: policy.label.clone(),
                path,
                state: status.kind(),
                last,
                detail,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verify_error: Option<&str>) -> PersistReport {
        PersistReport {
            path: PathBuf::from("x.csv"),
            rows_before: 0,
            rows_after: 1,
            last_timestamp: None,
            content_hash: String::new(),
            verify_error: verify_error.map(String::from),
        }
    }

    fn result(outcome: PairOutcome) -> PairResult {
        PairResult {
            symbol: "QQQ".into(),
            timeframe: "daily_10y".into(),
            path: PathBuf::from("x.csv"),
            outcome,
        }
    }

    #[test]
    fn summary_counts_outcomes() {
        let summary = SyncSummary::from_results(vec![
            result(PairOutcome::Written {
                report: report(None),
                cold: true,
                merge_degraded: false,
                duplicates_removed: 0,
            }),
            result(PairOutcome::NoNewData),
            result(PairOutcome::FetchFailed {
                error: "down".into(),
            }),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.no_new_data, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.any_failed());
    }

    #[test]
    fn unverified_write_counts_as_failure() {
        let outcome = PairOutcome::Written {
            report: report(Some("read back 0 rows, wrote 1")),
            cold: false,
            merge_degraded: false,
            duplicates_removed: 0,
        };
        assert!(outcome.is_failure());
        assert!(!PairOutcome::NoNewData.is_failure());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(PairOutcome::NoNewData).unwrap();
        assert_eq!(json["status"], "no_new_data");
    }
}

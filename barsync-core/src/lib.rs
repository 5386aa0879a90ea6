//! Barsync Core — incremental reconciliation of local OHLCV datasets.
//!
//! Each configured (symbol, timeframe) pair is kept as one CSV file. A run
//! reads the local cursor, plans a fetch window with a trailing overlap,
//! fetches from a [`data::DataProvider`], merges with the stored rows (new
//! rows win on conflict) and rewrites the file, verifying it afterwards.
//!
//! - Domain types (bars, intervals, timeframe policies)
//! - Market clock capability (exchange time zone, session open, trading days)
//! - Local store (table I/O, cursor derivation, persister)
//! - Reconciler (window planning, post-fetch filter, merge/dedup)
//! - Orchestrator over the symbol × timeframe matrix

pub mod clock;
pub mod config;
pub mod data;
pub mod domain;
pub mod reconcile;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use sync::{PairOutcome, PairResult, SyncSummary, Synchronizer};

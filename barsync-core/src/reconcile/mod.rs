//! Reconciler: fetch window planning, post-fetch filter and merge/dedup.

pub mod merge;
pub mod window;

pub use merge::{merge_bars, MergeError, MergeOutcome};
pub use window::{filter_threshold, plan_window, retain_after, FetchWindow};

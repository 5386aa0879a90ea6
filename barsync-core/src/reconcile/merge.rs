//! Merge/dedup of a stored table with freshly fetched rows.
//!
//! Existing rows are stacked first, incoming rows second; deduplication keeps
//! the last occurrence per timestamp so provider revisions replace stale
//! local values.

use crate::domain::Bar;
use chrono::DateTime;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("frame operation failed: {0}")]
    Frame(#[from] PolarsError),

    #[error("timestamp {0} out of range")]
    Timestamp(i64),
}

/// Result of combining two tables.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// Sorted ascending, one row per timestamp.
    #[serde(skip)]
    pub bars: Vec<Bar>,
    pub existing_rows: usize,
    pub new_rows: usize,
    pub duplicates_removed: usize,
}

impl MergeOutcome {
    /// Canonicalize `incoming` alone, ignoring whatever is on disk.
    ///
    /// Used when the frame merge fails; needs nothing beyond the standard
    /// library so it cannot fail itself.
    pub fn new_only(incoming: Vec<Bar>) -> Self {
        let new_rows = incoming.len();
        let mut bars = incoming;
        bars.sort_by_key(|b| b.timestamp);

        // Stable sort keeps fetch order among equal timestamps; keep the last.
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
                _ => deduped.push(bar),
            }
        }

        Self {
            duplicates_removed: new_rows - deduped.len(),
            bars: deduped,
            existing_rows: 0,
            new_rows,
        }
    }
}

/// Concatenate, dedup by timestamp keeping `incoming` on conflict, sort.
pub fn merge_bars(existing: &[Bar], incoming: &[Bar]) -> Result<MergeOutcome, MergeError> {
    let stacked = concat(
        [to_frame(existing)?.lazy(), to_frame(incoming)?.lazy()],
        UnionArgs::default(),
    )?;

    let merged = stacked
        .unique_stable(Some(vec!["ts".into()]), UniqueKeepStrategy::Last)
        .sort(
            ["ts"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let bars = from_frame(&merged)?;
    let total = existing.len() + incoming.len();

    Ok(MergeOutcome {
        duplicates_removed: total - bars.len(),
        bars,
        existing_rows: existing.len(),
        new_rows: incoming.len(),
    })
}

fn to_frame(bars: &[Bar]) -> PolarsResult<DataFrame> {
    let ts: Vec<i64> = bars.iter().map(|b| b.timestamp.and_utc().timestamp()).collect();
    let open: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("ts".into(), ts),
        Column::new("open".into(), open),
        Column::new("high".into(), high),
        Column::new("low".into(), low),
        Column::new("close".into(), close),
        Column::new("volume".into(), volume),
    ])
}

fn from_frame(df: &DataFrame) -> Result<Vec<Bar>, MergeError> {
    let ts = df.column("ts")?.i64()?;
    let open = df.column("open")?.f64()?;
    let high = df.column("high")?.f64()?;
    let low = df.column("low")?.f64()?;
    let close = df.column("close")?.f64()?;
    let volume = df.column("volume")?.f64()?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let secs = ts
            .get(i)
            .ok_or_else(|| PolarsError::ComputeError("null timestamp".into()))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or(MergeError::Timestamp(secs))?
            .naive_utc();

        bars.push(Bar {
            timestamp,
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(f64::NAN),
        });
    }
    Ok(bars)
}

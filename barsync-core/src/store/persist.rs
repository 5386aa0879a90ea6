//! Persister — full rewrite of a series file, verified by reading it back.
//!
//! Writes are atomic: render to `{file}.tmp`, then rename into place.

use super::table::{read_table, render_table, TableFormat};
use crate::domain::Bar;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no write permission for {path}")]
    ReadOnly { path: PathBuf },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode table: {0}")]
    Encode(#[from] csv::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Observability record of one write. Not used for control flow.
#[derive(Debug, Clone, Serialize)]
pub struct PersistReport {
    pub path: PathBuf,
    pub rows_before: usize,
    pub rows_after: usize,
    pub last_timestamp: Option<NaiveDateTime>,
    /// blake3 of the bytes written.
    pub content_hash: String,
    /// Set when the read-back check failed. The file is left as written.
    pub verify_error: Option<String>,
}

impl PersistReport {
    pub fn new_rows(&self) -> usize {
        self.rows_after.saturating_sub(self.rows_before)
    }

    pub fn verified(&self) -> bool {
        self.verify_error.is_none()
    }
}

/// Replace the file at `path` with `bars` and verify the result.
///
/// `rows_before` is the row count of the table being replaced, for reporting.
pub fn persist(
    bars: &[Bar],
    path: &Path,
    rows_before: usize,
    format: TableFormat,
) -> Result<PersistReport, PersistError> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.permissions().readonly() {
            return Err(PersistError::ReadOnly {
                path: path.to_path_buf(),
            });
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let bytes = render_table(bars, format)?;
    let content_hash = blake3::hash(&bytes).to_hex().to_string();

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, &bytes).map_err(|source| PersistError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        PersistError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut last_timestamp = bars.iter().map(|b| b.timestamp).max();
    let verify_error = match read_table(path, format.interval) {
        Ok(table) if table.bars.len() != bars.len() => Some(format!(
            "read back {} rows, wrote {}",
            table.bars.len(),
            bars.len()
        )),
        Ok(table) => {
            last_timestamp = table.last_timestamp();
            None
        }
        Err(e) => Some(e.to_string()),
    };

    Ok(PersistReport {
        path: path.to_path_buf(),
        rows_before,
        rows_after: bars.len(),
        last_timestamp,
        content_hash,
        verify_error,
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

//! CSV series table: one file per (symbol, timeframe).
//!
//! Header is exactly `Date,Open,High,Low,Close,Volume`. Loading tolerates
//! extra columns and reordered headers; writing always emits the fixed order.

use crate::domain::{Bar, Interval};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Required columns, in write order.
pub const COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// Oldest year a stored series may end in before it is considered garbage.
pub const MIN_TRUSTED_YEAR: i32 = 2000;

/// How a table is rendered on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    pub interval: Interval,
    /// Fixed decimal places for value columns; `None` writes shortest round-trip.
    pub decimals: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{path} does not exist")]
    Missing { path: PathBuf },

    #[error("no read permission for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid columns in {path}: missing {missing:?}, found {found:?}")]
    MissingColumns {
        path: PathBuf,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("no valid rows in {path}")]
    NoValidRows { path: PathBuf },

    #[error("suspicious last timestamp {last} in {path}")]
    SuspiciousDate { path: PathBuf, last: NaiveDateTime },
}

/// Bars loaded from disk, in file order.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub bars: Vec<Bar>,
    /// Rows skipped because a timestamp or value failed to parse.
    pub dropped_rows: usize,
}

impl LoadedTable {
    /// Latest timestamp in the table.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.iter().map(|b| b.timestamp).max()
    }
}

/// Load a series table and validate its shape.
///
/// Rows whose timestamp or values fail to parse are dropped, not fatal.
/// A table with no surviving rows is an error.
pub fn read_table(path: &Path, interval: Interval) -> Result<LoadedTable, ReadError> {
    let file = fs::File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ReadError::Missing {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => ReadError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ReadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| ReadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let positions: HashMap<&str, usize> =
        headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    let missing: Vec<String> = COLUMNS
        .iter()
        .filter(|c| !positions.contains_key(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReadError::MissingColumns {
            path: path.to_path_buf(),
            missing,
            found: headers.iter().map(String::from).collect(),
        });
    }
    let idx = COLUMNS.map(|c| positions[c]);

    let mut bars = Vec::new();
    let mut dropped_rows = 0;

    for record in reader.records() {
        let Ok(record) = record else {
            dropped_rows += 1;
            continue;
        };

        let value = |i: usize| record.get(idx[i]).and_then(|v| v.parse::<f64>().ok());
        let timestamp = record
            .get(idx[0])
            .and_then(|raw| interval.parse_timestamp(raw));

        match (timestamp, value(1), value(2), value(3), value(4), value(5)) {
            (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                bars.push(Bar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            }
            _ => dropped_rows += 1,
        }
    }

    if dropped_rows > 0 {
        debug!(path = %path.display(), dropped_rows, "skipped unparseable rows");
    }

    if bars.is_empty() {
        return Err(ReadError::NoValidRows {
            path: path.to_path_buf(),
        });
    }

    Ok(LoadedTable { bars, dropped_rows })
}

/// Render bars as CSV bytes in the fixed column order.
pub fn render_table(bars: &[Bar], format: TableFormat) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(COLUMNS)?;

    for bar in bars {
        wtr.write_record([
            format.interval.format_timestamp(bar.timestamp),
            format_value(bar.open, format.decimals),
            format_value(bar.high, format.decimals),
            format_value(bar.low, format.decimals),
            format_value(bar.close, format.decimals),
            format_volume(bar.volume, format.decimals),
        ])?;
    }

    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

fn format_value(value: f64, decimals: Option<u32>) -> String {
    match decimals {
        Some(d) => format!("{:.*}", d as usize, value),
        None => format!("{value}"),
    }
}

/// Whole-share volumes are written without a fractional part.
fn format_volume(value: f64, decimals: Option<u32>) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format_value(value, decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn bar(ts: &str, close: f64) -> Bar {
        Bar {
            timestamp: Interval::Daily.parse_timestamp(ts).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close,
            volume: 1_000_000.0,
        }
    }

    #[test]
    fn reads_well_formed_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "t.csv",
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-09,99.00,100.00,98.00,99.50,900000\n\
             2024-01-10,100.00,101.00,99.00,100.50,1000000\n",
        );
        let table = read_table(&path, Interval::Daily).unwrap();
        assert_eq!(table.bars.len(), 2);
        assert_eq!(table.dropped_rows, 0);
        assert_eq!(table.bars[1].close, 100.5);
        assert_eq!(
            table.last_timestamp(),
            Interval::Daily.parse_timestamp("2024-01-10")
        );
    }

    #[test]
    fn tolerates_reordered_and_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "t.csv",
            "Close,Date,Volume,Open,Low,High,Adj Close\n\
             100.5,2024-01-10,1000000,100,99,101,100.1\n",
        );
        let table = read_table(&path, Interval::Daily).unwrap();
        assert_eq!(table.bars, vec![bar("2024-01-10", 100.5)]);
    }

    #[test]
    fn drops_unparseable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "t.csv",
            "Date,Open,High,Low,Close,Volume\n\
             garbage,1,1,1,1,1\n\
             2024-01-10,100,101,99,100.5,1000000\n\
             2024-01-11,abc,101,99,100.5,1000000\n",
        );
        let table = read_table(&path, Interval::Daily).unwrap();
        assert_eq!(table.bars.len(), 1);
        assert_eq!(table.dropped_rows, 2);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "t.csv",
            "Date,Open,High,Low,Close\n2024-01-10,100,101,99,100.5\n",
        );
        match read_table(&path, Interval::Daily) {
            Err(ReadError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, vec!["Volume".to_string()])
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(&dir.path().join("nope.csv"), Interval::Daily).unwrap_err();
        assert!(matches!(err, ReadError::Missing { .. }));
    }

    #[test]
    fn header_only_has_no_valid_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "Date,Open,High,Low,Close,Volume\n");
        let err = read_table(&path, Interval::Daily).unwrap_err();
        assert!(matches!(err, ReadError::NoValidRows { .. }));
    }

    #[test]
    fn renders_fixed_precision() {
        let bytes = render_table(
            &[bar("2024-01-10", 100.5)],
            TableFormat {
                interval: Interval::Daily,
                decimals: Some(2),
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Date,Open,High,Low,Close,Volume\n2024-01-10,100.00,101.00,99.00,100.50,1000000\n"
        );
    }

    #[test]
    fn renders_shortest_form_without_rounding() {
        let mut b = bar("2024-01-10", 100.755);
        b.volume = 1234.5;
        let bytes = render_table(
            &[b],
            TableFormat {
                interval: Interval::Daily,
                decimals: None,
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Date,Open,High,Low,Close,Volume\n2024-01-10,100,101,99,100.755,1234.5\n"
        );
    }

    #[test]
    fn rendered_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let bars = vec![bar("2024-01-09", 99.25), bar("2024-01-10", 100.5)];
        let format = TableFormat {
            interval: Interval::Daily,
            decimals: None,
        };
        let path = dir.path().join("t.csv");
        fs::write(&path, render_table(&bars, format).unwrap()).unwrap();
        assert_eq!(read_table(&path, Interval::Daily).unwrap().bars, bars);
    }
}

//! JSON Lines hit tables.
//!
//! Each data line holds one chunk as a declared row count plus parallel
//! column arrays:
//!
//! ```text
//! {"n_entries":2,"event_id":[0,0],"trigger_timestamp":[9,9],"column":[3,4],"row":[10,11],...}
//! ```
//!
//! `event_id`, `trigger_timestamp`, `column` and `row` are required.
//! Every other column may be omitted and then reads as zeros. Lines that
//! are blank or start with `#` are skipped. `tdc_timestamp` is read as
//! `u16`, which also covers tables written with the narrower 8-bit field.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BUFFER_CAPACITY, Chunk, HitSource, SourceError, check_capacity};
use crate::model::{Diagnostics, FlatHitRow};

/// Only the declared size, so oversized chunks are rejected before their
/// columns are allocated.
#[derive(Deserialize)]
struct ChunkHeader {
    n_entries: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChunkColumns {
    n_entries: usize,
    event_id: Vec<i64>,
    trigger_timestamp: Vec<u32>,
    column: Vec<u8>,
    row: Vec<u16>,
    #[serde(default)]
    relative_timing: Vec<u8>,
    #[serde(default)]
    value: Vec<u8>,
    #[serde(default)]
    tdc: Vec<u16>,
    #[serde(default)]
    tdc_timestamp: Vec<u16>,
    #[serde(default)]
    trigger_status: Vec<u8>,
    #[serde(default)]
    event_status: Vec<u16>,
    #[serde(default)]
    trigger_number: Vec<u32>,
    #[serde(default)]
    lvl1id: Vec<u16>,
    #[serde(default)]
    bcid: Vec<u16>,
    #[serde(default)]
    service_record: Vec<u32>,
}

/// Length check for one column. Optional columns may be empty.
fn check_len<T>(
    chunk: usize,
    column: &'static str,
    values: &[T],
    expected: usize,
    optional: bool,
) -> Result<(), SourceError> {
    if values.len() == expected || (optional && values.is_empty()) {
        return Ok(());
    }
    Err(SourceError::ColumnLength {
        chunk,
        column,
        found: values.len(),
        expected,
    })
}

fn at<T: Copy + Default>(values: &[T], i: usize) -> T {
    values.get(i).copied().unwrap_or_default()
}

impl ChunkColumns {
    fn validate(&self, chunk: usize) -> Result<(), SourceError> {
        let n = self.n_entries;
        check_len(chunk, "event_id", &self.event_id, n, false)?;
        check_len(chunk, "trigger_timestamp", &self.trigger_timestamp, n, false)?;
        check_len(chunk, "column", &self.column, n, false)?;
        check_len(chunk, "row", &self.row, n, false)?;
        check_len(chunk, "relative_timing", &self.relative_timing, n, true)?;
        check_len(chunk, "value", &self.value, n, true)?;
        check_len(chunk, "tdc", &self.tdc, n, true)?;
        check_len(chunk, "tdc_timestamp", &self.tdc_timestamp, n, true)?;
        check_len(chunk, "trigger_status", &self.trigger_status, n, true)?;
        check_len(chunk, "event_status", &self.event_status, n, true)?;
        check_len(chunk, "trigger_number", &self.trigger_number, n, true)?;
        check_len(chunk, "lvl1id", &self.lvl1id, n, true)?;
        check_len(chunk, "bcid", &self.bcid, n, true)?;
        check_len(chunk, "service_record", &self.service_record, n, true)
    }

    fn into_rows(self) -> Vec<FlatHitRow> {
        (0..self.n_entries)
            .map(|i| FlatHitRow {
                event_id: self.event_id[i],
                trigger_timestamp: self.trigger_timestamp[i],
                relative_timing: at(&self.relative_timing, i),
                column: self.column[i],
                row: self.row[i],
                value: at(&self.value, i),
                diagnostics: Diagnostics {
                    tdc: at(&self.tdc, i),
                    tdc_timestamp: at(&self.tdc_timestamp, i),
                    trigger_status: at(&self.trigger_status, i),
                    event_status: at(&self.event_status, i),
                    trigger_number: at(&self.trigger_number, i),
                    lvl1id: at(&self.lvl1id, i),
                    bcid: at(&self.bcid, i),
                    service_record: at(&self.service_record, i),
                },
            })
            .collect()
    }

    fn from_rows(rows: &[FlatHitRow]) -> Self {
        let mut cols = Self {
            n_entries: rows.len(),
            ..Self::default()
        };
        for row in rows {
            let d = &row.diagnostics;
            cols.event_id.push(row.event_id);
            cols.trigger_timestamp.push(row.trigger_timestamp);
            cols.column.push(row.column);
            cols.row.push(row.row);
            cols.relative_timing.push(row.relative_timing);
            cols.value.push(row.value);
            cols.tdc.push(d.tdc);
            cols.tdc_timestamp.push(d.tdc_timestamp);
            cols.trigger_status.push(d.trigger_status);
            cols.event_status.push(d.event_status);
            cols.trigger_number.push(d.trigger_number);
            cols.lvl1id.push(d.lvl1id);
            cols.bcid.push(d.bcid);
            cols.service_record.push(d.service_record);
        }
        cols
    }
}

/// Serialize rows as one chunk line (without trailing newline).
///
/// # Errors
///
/// Returns the underlying serializer error, which cannot happen for the
/// plain integer columns used here.
pub fn encode_chunk(rows: &[FlatHitRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ChunkColumns::from_rows(rows))
}

/// Decode one chunk line into rows, enforcing `capacity`.
///
/// # Errors
///
/// Returns [`SourceError`] if the line is not a valid chunk, declares more
/// rows than `capacity`, or has columns of the wrong length.
pub fn decode_chunk(
    line: &str,
    line_no: usize,
    chunk: usize,
    capacity: usize,
) -> Result<Vec<FlatHitRow>, SourceError> {
    let decode = |source| SourceError::Decode {
        line: line_no,
        source,
    };
    let header: ChunkHeader = serde_json::from_str(line).map_err(decode)?;
    check_capacity(chunk, header.n_entries, capacity)?;

    let columns: ChunkColumns = serde_json::from_str(line).map_err(decode)?;
    columns.validate(chunk)?;
    Ok(columns.into_rows())
}

/// Streams chunks from a JSON Lines hit table on disk.
pub struct ChunkFileReader {
    path: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    chunk: usize,
    capacity: usize,
}

impl ChunkFileReader {
    /// Open a hit table for reading.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            path: path.display().to_string(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            chunk: 0,
            capacity: BUFFER_CAPACITY,
        })
    }

    /// Override the per-chunk capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl HitSource for ChunkFileReader {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            self.chunk += 1;
            let rows = decode_chunk(trimmed, self.line_no, self.chunk, self.capacity)?;
            debug!(chunk = self.chunk, size = rows.len(), "reading chunk");
            return Ok(Some(Chunk {
                index: self.chunk,
                rows,
            }));
        }
        Ok(None)
    }
}

//! Event and Hits table files.
//!
//! Both are JSON Lines with an optional leading `#` header. Each line of a
//! Hits table is one hit group stored column-wise; each line of the Event
//! table is one [`EventRecord`].

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StoreError;
use crate::companion::{CompanionEvents, VecCompanion};
use crate::error::ConvertError;
use crate::model::{EventRecord, HitGroup};
use crate::sink::EventSink;

const EVENTS_HEADER: &str = "# pixconv events v1";
const HITS_HEADER: &str = "# pixconv hits v1";
const EVENTS_FIELDS: &str = "# fields: timestamp frame_number trigger_offset trigger_info invalid";

/// Header written at the top of a fresh Event table.
#[must_use]
pub fn events_header() -> String {
    format!("{EVENTS_HEADER}\n{EVENTS_FIELDS}\n")
}

fn is_skipped(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

// ---------------------------------------------------------------------------
// Hit columns
// ---------------------------------------------------------------------------

/// One hit group in column form, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitColumns {
    pub count: usize,
    pub pixel_x: Vec<i32>,
    pub pixel_y: Vec<i32>,
    pub pos_x: Vec<f64>,
    pub pos_y: Vec<f64>,
    pub pos_z: Vec<f64>,
    pub value: Vec<i32>,
    pub timing: Vec<i32>,
    pub cluster_id: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticColumns>,
}

/// Optional readout columns of a hit group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticColumns {
    pub tdc: Vec<u16>,
    pub tdc_timestamp: Vec<u16>,
    pub trigger_status: Vec<u8>,
    pub event_status: Vec<u16>,
    pub trigger_number: Vec<u32>,
    pub lvl1id: Vec<u16>,
    pub bcid: Vec<u16>,
    pub service_record: Vec<u32>,
}

impl HitColumns {
    /// Transpose a hit group. Diagnostic columns are kept only if asked for.
    #[must_use]
    pub fn from_group(hits: &HitGroup, diagnostics: bool) -> Self {
        let n = hits.len();
        let mut columns = Self {
            count: n,
            pixel_x: Vec::with_capacity(n),
            pixel_y: Vec::with_capacity(n),
            pos_x: Vec::with_capacity(n),
            pos_y: Vec::with_capacity(n),
            pos_z: Vec::with_capacity(n),
            value: Vec::with_capacity(n),
            timing: Vec::with_capacity(n),
            cluster_id: Vec::with_capacity(n),
            diagnostics: diagnostics.then(DiagnosticColumns::default),
        };
        for hit in hits {
            columns.pixel_x.push(hit.pixel_x);
            columns.pixel_y.push(hit.pixel_y);
            columns.pos_x.push(hit.pos_x);
            columns.pos_y.push(hit.pos_y);
            columns.pos_z.push(hit.pos_z);
            columns.value.push(hit.value);
            columns.timing.push(hit.timing);
            columns.cluster_id.push(hit.cluster_id);
            if let Some(diag) = columns.diagnostics.as_mut() {
                let d = hit.diagnostics;
                diag.tdc.push(d.tdc);
                diag.tdc_timestamp.push(d.tdc_timestamp);
                diag.trigger_status.push(d.trigger_status);
                diag.event_status.push(d.event_status);
                diag.trigger_number.push(d.trigger_number);
                diag.lvl1id.push(d.lvl1id);
                diag.bcid.push(d.bcid);
                diag.service_record.push(d.service_record);
            }
        }
        columns
    }
}

/// Read every hit group of a Hits table, in order.
///
/// # Errors
///
/// Returns [`StoreError`] if the file cannot be read or a line is invalid.
pub fn read_hit_columns(path: &Path) -> Result<Vec<HitColumns>, StoreError> {
    read_lines(path)
}

fn read_lines<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = File::open(path).map_err(StoreError::io(path))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(StoreError::io(path))?;
        if is_skipped(&line) {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        out.push(value);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// EventTable
// ---------------------------------------------------------------------------

/// An Event table loaded from disk, consumed front to back.
#[derive(Debug, Clone)]
pub struct EventTable {
    records: VecCompanion,
}

impl EventTable {
    /// Load every record of the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read or a record fails
    /// to decode.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let records: Vec<EventRecord> = read_lines(path)?;
        debug!(path = %path.display(), records = records.len(), "event table loaded");
        Ok(Self {
            records: VecCompanion::new(records),
        })
    }
}

impl CompanionEvents for EventTable {
    fn len(&self) -> u64 {
        self.records.len()
    }

    fn next_record(&mut self) -> Option<EventRecord> {
        self.records.next_record()
    }
}

// ---------------------------------------------------------------------------
// TableSink
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LineWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl LineWriter {
    fn create(path: &Path, header: &str) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(StoreError::io(path))?;
        let mut out = BufWriter::new(file);
        out.write_all(header.as_bytes())
            .map_err(StoreError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
        })
    }

    fn write_row<T: Serialize>(&mut self, row: &T) -> Result<(), StoreError> {
        serde_json::to_writer(&mut self.out, row).map_err(StoreError::Encode)?;
        self.out
            .write_all(b"\n")
            .map_err(StoreError::io(&self.path))
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.out.flush().map_err(StoreError::io(&self.path))
    }
}

/// Writes hit groups, and in author mode event records, to the store.
#[derive(Debug)]
pub struct TableSink {
    hits: LineWriter,
    events: Option<LineWriter>,
    diagnostics: bool,
}

impl TableSink {
    /// Create the Hits table at `hits_path` and, if `events_path` is given,
    /// a fresh Event table. Neither file may exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a file exists or cannot be created.
    pub fn create(
        hits_path: &Path,
        events_path: Option<&Path>,
        diagnostics: bool,
    ) -> Result<Self, StoreError> {
        let hits = LineWriter::create(hits_path, &format!("{HITS_HEADER}\n"))?;
        let events = events_path
            .map(|path| LineWriter::create(path, &events_header()))
            .transpose()?;
        Ok(Self {
            hits,
            events,
            diagnostics,
        })
    }
}

impl EventSink for TableSink {
    fn write(&mut self, record: Option<&EventRecord>, hits: &HitGroup) -> Result<(), ConvertError> {
        match (record, self.events.as_mut()) {
            (Some(record), Some(events)) => events.write_row(record)?,
            (None, None) => {}
            (Some(_), None) => {
                return Err(ConvertError::Alignment("event record without an event table"));
            }
            (None, Some(_)) => {
                return Err(ConvertError::Alignment("event table row missing its record"));
            }
        }
        self.hits
            .write_row(&HitColumns::from_group(hits, self.diagnostics))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConvertError> {
        if let Some(events) = self.events.as_mut() {
            events.flush()?;
        }
        self.hits.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Diagnostics, FlatHitRow, Hit};
    use tempfile::TempDir;

    fn group(rows: &[(u8, u16)]) -> HitGroup {
        let mut group = HitGroup::new();
        for &(column, row) in rows {
            group
                .push(Hit::from_row(&FlatHitRow {
                    column,
                    row,
                    value: 7,
                    diagnostics: Diagnostics {
                        tdc: 300,
                        bcid: 9,
                        ..Diagnostics::default()
                    },
                    ..FlatHitRow::default()
                }))
                .expect("below cap");
        }
        group
    }

    fn record(frame: u64) -> EventRecord {
        EventRecord {
            timestamp: frame * 3,
            frame_number: frame,
            trigger_offset: 0,
            trigger_info: 0,
            invalid: frame == 1,
        }
    }

    #[test]
    fn columns_are_transposed() {
        let columns = HitColumns::from_group(&group(&[(1, 1), (80, 336)]), false);
        assert_eq!(columns.count, 2);
        assert_eq!(columns.pixel_x, vec![0, 79]);
        assert_eq!(columns.pixel_y, vec![0, 335]);
        assert_eq!(columns.cluster_id, vec![-1, -1]);
        assert!(columns.diagnostics.is_none());
    }

    #[test]
    fn diagnostics_only_when_enabled() {
        let plain = serde_json::to_string(&HitColumns::from_group(&group(&[(2, 2)]), false))
            .expect("encode");
        assert!(!plain.contains("tdc"));

        let full = HitColumns::from_group(&group(&[(2, 2)]), true);
        let diag = full.diagnostics.expect("diagnostics");
        assert_eq!(diag.tdc, vec![300]);
        assert_eq!(diag.bcid, vec![9]);
    }

    #[test]
    fn author_sink_writes_both_tables_in_step() {
        let tmp = TempDir::new().expect("tempdir");
        let hits_path = tmp.path().join("hits.jsonl");
        let events_path = tmp.path().join("events.jsonl");
        let mut sink = TableSink::create(&hits_path, Some(&events_path), true).expect("create");
        sink.write(Some(&record(0)), &group(&[(1, 1)])).expect("write");
        sink.write(Some(&record(1)), &HitGroup::new()).expect("write empty");
        sink.flush().expect("flush");

        let text = std::fs::read_to_string(&events_path).expect("read");
        assert!(text.starts_with(&events_header()));

        let mut table = EventTable::load(&events_path).expect("load");
        assert_eq!(table.len(), 2);
        assert_eq!(table.next_record(), Some(record(0)));
        assert_eq!(table.next_record().map(|r| r.invalid), Some(true));

        let groups = read_hit_columns(&hits_path).expect("hits");
        let counts: Vec<usize> = groups.iter().map(|g| g.count).collect();
        assert_eq!(counts, vec![1, 0]);
        assert!(groups[0].diagnostics.is_some());
    }

    #[test]
    fn hits_only_sink_rejects_records() {
        let tmp = TempDir::new().expect("tempdir");
        let mut sink =
            TableSink::create(&tmp.path().join("hits.jsonl"), None, false).expect("create");
        sink.write(None, &group(&[(3, 3)])).expect("hits only");
        assert!(matches!(
            sink.write(Some(&record(0)), &HitGroup::new()),
            Err(ConvertError::Alignment(_))
        ));
    }

    #[test]
    fn existing_hits_file_is_not_overwritten() {
        let tmp = TempDir::new().expect("tempdir");
        let hits_path = tmp.path().join("hits.jsonl");
        std::fs::write(&hits_path, "keep\n").expect("seed");
        assert!(TableSink::create(&hits_path, None, false).is_err());
        assert_eq!(std::fs::read_to_string(&hits_path).expect("read"), "keep\n");
    }

    #[test]
    fn event_table_reports_bad_line() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("events.jsonl");
        std::fs::write(&path, "# header\n\n{\"timestamp\":1,\"frame_number\":0}\nnot json\n")
            .expect("seed");
        let err = EventTable::load(&path).expect_err("bad line");
        assert!(matches!(err, StoreError::Decode { line: 4, .. }));
    }
}

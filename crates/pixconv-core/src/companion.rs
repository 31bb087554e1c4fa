//! Read-only, sequential access to an existing Event table.
//!
//! In Verifier mode the segmenter pulls one record per event boundary, in
//! table order, and checks it against the hit stream.

use std::collections::VecDeque;

use crate::model::EventRecord;

/// A pre-existing sequence of event records.
pub trait CompanionEvents {
    /// Total number of records in the table, consumed or not.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The next unconsumed record, or `None` if the table is exhausted.
    fn next_record(&mut self) -> Option<EventRecord>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecCompanion {
    records: VecDeque<EventRecord>,
    total: u64,
}

impl VecCompanion {
    #[must_use]
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self {
            total: records.len() as u64,
            records: records.into(),
        }
    }
}

impl From<Vec<EventRecord>> for VecCompanion {
    fn from(records: Vec<EventRecord>) -> Self {
        Self::new(records)
    }
}

impl CompanionEvents for VecCompanion {
    fn len(&self) -> u64 {
        self.total
    }

    fn next_record(&mut self) -> Option<EventRecord> {
        self.records.pop_front()
    }
}

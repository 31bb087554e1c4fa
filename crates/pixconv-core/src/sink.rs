//! Destinations for finalized events.
//!
//! The Nth hit group written belongs to the Nth event record of the Event
//! table. There is no explicit key between the two; positional alignment
//! is the contract, so a sink only ever appends.
//!
//! [`Emitter`] sits between the segmenter and a concrete [`EventSink`]. It
//! enforces the hit and event caps and decides whether records travel with
//! their hit groups.

use crate::error::ConvertError;
use crate::model::{EventRecord, HitGroup, MAX_HITS};

/// Something that stores finalized events.
pub trait EventSink {
    /// Append one event. `record` is present only when the Event table is
    /// being authored.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the event cannot be stored.
    fn write(&mut self, record: Option<&EventRecord>, hits: &HitGroup) -> Result<(), ConvertError>;

    /// Push buffered output to its destination.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the flush fails.
    fn flush(&mut self) -> Result<(), ConvertError> {
        Ok(())
    }
}

impl<K: EventSink + ?Sized> EventSink for &mut K {
    fn write(&mut self, record: Option<&EventRecord>, hits: &HitGroup) -> Result<(), ConvertError> {
        (**self).write(record, hits)
    }

    fn flush(&mut self) -> Result<(), ConvertError> {
        (**self).flush()
    }
}

/// Whether event records accompany hit groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Author mode: every hit group comes with the record it belongs to.
    WithRecords,
    /// Verifier mode: records already live in the Event table.
    HitsOnly,
}

/// Guards a sink with the per-event and per-run caps.
#[derive(Debug)]
pub struct Emitter<K> {
    sink: K,
    alignment: Alignment,
    limit: Option<u64>,
    emitted: u64,
    hits_written: u64,
}

impl<K: EventSink> Emitter<K> {
    #[must_use]
    pub const fn new(sink: K, alignment: Alignment) -> Self {
        Self {
            sink,
            alignment,
            limit: None,
            emitted: 0,
            hits_written: 0,
        }
    }

    /// Refuse to emit more than `limit` events. `None` means unbounded.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Hand one finalized event to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] when the group is over [`MAX_HITS`], the
    /// event cap is reached, the record presence does not match the
    /// [`Alignment`], or the sink itself fails.
    pub fn emit(&mut self, record: Option<&EventRecord>, hits: &HitGroup) -> Result<(), ConvertError> {
        if hits.len() > MAX_HITS {
            return Err(ConvertError::HitGroupOverflow {
                len: hits.len(),
                max: MAX_HITS,
            });
        }
        match (self.alignment, record.is_some()) {
            (Alignment::WithRecords, false) => {
                return Err(ConvertError::Alignment(
                    "hit group emitted without its event record",
                ));
            }
            (Alignment::HitsOnly, true) => {
                return Err(ConvertError::Alignment(
                    "event record emitted while verifying an existing event table",
                ));
            }
            _ => {}
        }
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                return Err(ConvertError::EventCapExceeded {
                    attempted: self.emitted + 1,
                    limit,
                });
            }
        }

        self.sink.write(record, hits)?;
        self.emitted += 1;
        self.hits_written += hits.len() as u64;
        Ok(())
    }

    /// Number of events emitted so far.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of hits emitted so far, across all events.
    #[must_use]
    pub const fn hits_written(&self) -> u64 {
        self.hits_written
    }

    #[must_use]
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    /// Flush the sink and hand it back.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the flush fails.
    pub fn finish(mut self) -> Result<K, ConvertError> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub events: Vec<(Option<EventRecord>, HitGroup)>,
}

impl MemorySink {
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// The hit groups in emission order.
    pub fn groups(&self) -> impl Iterator<Item = &HitGroup> {
        self.events.iter().map(|(_, hits)| hits)
    }

    /// The authored records in emission order.
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.iter().filter_map(|(record, _)| record.as_ref())
    }
}

impl EventSink for MemorySink {
    fn write(&mut self, record: Option<&EventRecord>, hits: &HitGroup) -> Result<(), ConvertError> {
        self.events.push((record.copied(), hits.clone()));
        Ok(())
    }
}

/// Discards everything. Used for dry runs, where only the counts matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn write(&mut self, _record: Option<&EventRecord>, _hits: &HitGroup) -> Result<(), ConvertError> {
        Ok(())
    }
}

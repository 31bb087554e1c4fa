use serde::{Deserialize, Serialize};

use super::hit::FlatHitRow;

/// `event_status` bit raised by the readout when it saw an unknown data word.
pub const UNKNOWN_WORD_BIT: u16 = 0b0000_0000_0001_0000;

/// One row of the Event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Clock A sample taken from the first row of the event.
    pub timestamp: u64,
    /// The event id that opened this event.
    pub frame_number: u64,
    #[serde(default)]
    pub trigger_offset: i32,
    #[serde(default)]
    pub trigger_info: i32,
    #[serde(default)]
    pub invalid: bool,
}

impl EventRecord {
    /// Author a record from the row that opened the event.
    ///
    /// `frame_number` is passed separately because the caller has already
    /// checked that the row's event id is non-negative.
    #[must_use]
    pub fn author(row: &FlatHitRow, frame_number: u64) -> Self {
        Self {
            timestamp: u64::from(row.trigger_timestamp),
            frame_number,
            trigger_offset: 0,
            trigger_info: 0,
            invalid: row.diagnostics.event_status & UNKNOWN_WORD_BIT != 0,
        }
    }
}

#![allow(dead_code)]

use pixconv_core::model::{FlatHitRow, MAX_COLUMN, MAX_ROW};
use proptest::prelude::*;

/// One generated event: its id and the `(column, row)` of each hit.
/// An empty hit list stands for a sentinel-only event.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub event_id: i64,
    pub hits: Vec<(u8, u16)>,
}

impl EventSpec {
    /// Rows this event contributes to the flat table.
    pub fn rows(&self) -> Vec<FlatHitRow> {
        let timestamp = u32::try_from(self.event_id * 25).unwrap_or(0);
        if self.hits.is_empty() {
            return vec![FlatHitRow {
                event_id: self.event_id,
                trigger_timestamp: timestamp,
                ..FlatHitRow::default()
            }];
        }
        self.hits
            .iter()
            .map(|&(column, row)| FlatHitRow {
                event_id: self.event_id,
                trigger_timestamp: timestamp,
                column,
                row,
                value: 1,
                ..FlatHitRow::default()
            })
            .collect()
    }
}

pub fn flatten(events: &[EventSpec]) -> Vec<FlatHitRow> {
    events.iter().flat_map(EventSpec::rows).collect()
}

pub fn arb_hit() -> impl Strategy<Value = (u8, u16)> {
    (1..=MAX_COLUMN, 1..=MAX_ROW)
}

/// Strictly increasing event ids with up to `max_hits` hits each.
pub fn arb_events(max_events: usize, max_hits: usize) -> impl Strategy<Value = Vec<EventSpec>> {
    prop::collection::vec(
        (1_i64..5, prop::collection::vec(arb_hit(), 0..=max_hits)),
        1..=max_events,
    )
    .prop_map(|specs| {
        let mut next_id = 0;
        specs
            .into_iter()
            .map(|(gap, hits)| {
                let event_id = next_id;
                next_id += gap;
                EventSpec { event_id, hits }
            })
            .collect()
    })
}

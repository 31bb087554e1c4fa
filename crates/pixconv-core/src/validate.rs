//! Per-row hit classification.
//!
//! [`classify`] decides what a single input row contributes to the event
//! it belongs to. It only reads the current fill count of the event's hit
//! group and never touches the group itself.

use crate::model::{FlatHitRow, Hit, MAX_COLUMN, MAX_HITS, MAX_ROW};

/// Why a row cannot be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRejection {
    /// Column or row outside the sensor, including a 0 sentinel that shows
    /// up after the event already has hits.
    OutOfRange { column: u8, row: u16 },
    /// The event already holds [`MAX_HITS`] hits.
    TooManyHits,
}

/// Outcome of classifying one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// The "empty event" sentinel row. Contributes nothing.
    Ignore,
    Accept(Hit),
    Fatal(HitRejection),
}

/// Classify `row` given how many hits its event already holds.
///
/// Order matters: the sentinel check comes first, then the hit cap, then
/// the coordinate bounds.
#[must_use]
pub fn classify(row: &FlatHitRow, hits_so_far: usize) -> Classification {
    if row.is_sentinel() && hits_so_far == 0 {
        return Classification::Ignore;
    }
    if hits_so_far >= MAX_HITS {
        return Classification::Fatal(HitRejection::TooManyHits);
    }
    if !(1..=MAX_COLUMN).contains(&row.column) || !(1..=MAX_ROW).contains(&row.row) {
        return Classification::Fatal(HitRejection::OutOfRange {
            column: row.column,
            row: row.row,
        });
    }
    Classification::Accept(Hit::from_row(row))
}

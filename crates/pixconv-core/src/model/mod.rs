//! Row, hit, and event record types shared by every stage of the pipeline.
//!
//! - [`FlatHitRow`]: one readout slot from the input table (ephemeral).
//! - [`Hit`] / [`HitGroup`]: the accepted hits of one event.
//! - [`EventRecord`]: per-event metadata, positionally aligned with the
//!   [`HitGroup`] emitted in the same slot.

pub mod event;
pub mod hit;

pub use event::{EventRecord, UNKNOWN_WORD_BIT};
pub use hit::{
    Diagnostics, FlatHitRow, Hit, HitGroup, HitGroupFull, MAX_COLUMN, MAX_HITS, MAX_ROW,
    UNASSIGNED_CLUSTER,
};

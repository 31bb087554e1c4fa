use serde::{Deserialize, Serialize};

/// Per-event hit cap. This count is part of the Hits table contract, so a
/// group never grows past it.
pub const MAX_HITS: usize = 4000;

/// Highest valid 1-based column on the sensor.
pub const MAX_COLUMN: u8 = 80;

/// Highest valid 1-based row on the sensor.
pub const MAX_ROW: u16 = 336;

/// `cluster_id` of a hit that no clustering pass has claimed yet.
pub const UNASSIGNED_CLUSTER: i32 = -1;

/// Readout fields carried through to the output untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub tdc: u16,
    pub tdc_timestamp: u16,
    pub trigger_status: u8,
    pub event_status: u16,
    pub trigger_number: u32,
    pub lvl1id: u16,
    pub bcid: u16,
    pub service_record: u32,
}

/// One readout slot of the input hit table.
///
/// Rows arrive grouped by `event_id` in contiguous runs. A `column` or `row`
/// of 0 marks a slot without a hit (the sentinel row of an empty event).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlatHitRow {
    pub event_id: i64,
    /// Clock A sample, a 31-bit counter that wraps.
    pub trigger_timestamp: u32,
    pub relative_timing: u8,
    /// 1-based column, 0 = no hit.
    pub column: u8,
    /// 1-based row, 0 = no hit.
    pub row: u16,
    /// Time over threshold.
    pub value: u8,
    pub diagnostics: Diagnostics,
}

impl FlatHitRow {
    /// Returns `true` if either coordinate carries the "no hit" sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.column == 0 || self.row == 0
    }
}

/// A single accepted pixel hit, in 0-based sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub pixel_x: i32,
    pub pixel_y: i32,
    pub value: i32,
    pub timing: i32,
    pub cluster_id: i32,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub diagnostics: Diagnostics,
}

impl Hit {
    /// Build a hit from a row whose coordinates are already known to be in
    /// range. Positions stay zero until a geometry pass fills them in.
    #[must_use]
    pub fn from_row(row: &FlatHitRow) -> Self {
        Self {
            pixel_x: i32::from(row.column) - 1,
            pixel_y: i32::from(row.row) - 1,
            value: i32::from(row.value),
            timing: i32::from(row.relative_timing),
            cluster_id: UNASSIGNED_CLUSTER,
            pos_x: 0.0,
            pos_y: 0.0,
            pos_z: 0.0,
            diagnostics: row.diagnostics,
        }
    }
}

/// Returned by [`HitGroup::push`] when the group already holds [`MAX_HITS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hit group is full ({MAX_HITS} hits)")]
pub struct HitGroupFull;

/// The ordered hits of one event. May be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitGroup {
    hits: Vec<Hit>,
}

impl HitGroup {
    #[must_use]
    pub const fn new() -> Self {
        Self { hits: Vec::new() }
    }

    /// Append a hit, refusing to grow past [`MAX_HITS`].
    ///
    /// # Errors
    ///
    /// Returns [`HitGroupFull`] if the group is already at capacity.
    pub fn push(&mut self, hit: Hit) -> Result<(), HitGroupFull> {
        if self.hits.len() >= MAX_HITS {
            return Err(HitGroupFull);
        }
        self.hits.push(hit);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    /// Empty the group while keeping its allocation for the next event.
    pub fn clear(&mut self) {
        self.hits.clear();
    }
}

impl<'a> IntoIterator for &'a HitGroup {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

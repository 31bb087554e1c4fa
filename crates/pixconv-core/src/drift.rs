//! Drift check between two clocks that should tick in lockstep.
//!
//! In Verifier mode every event carries two samples of the trigger clock:
//! the one already stored in the event table and the one read from the hit
//! stream being added. Both counters are 31 bits wide and wrap. From the
//! third event on, the per-event advance of both clocks is compared; a
//! ratio outside `1 ± tolerance` means the streams have drifted apart.
//!
//! Events 0 and 1 only seed the comparison, since some captures drop the
//! first clock sample.
//!
//! This is detection only. A failed check aborts the conversion.

/// Modulus of the 31-bit trigger clock.
pub const CLOCK_WRAP: u64 = 1 << 31;

/// Default accepted deviation of the drift ratio from 1.0.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Number of leading events exempt from the check.
pub const SEED_EVENTS: u64 = 2;

/// Advance of a wrapping 31-bit counter from `last` to `current`.
#[must_use]
pub const fn clock_delta(last: u64, current: u64) -> u64 {
    if current >= last {
        current - last
    } else {
        current + CLOCK_WRAP.saturating_sub(last)
    }
}

/// Ratio of the two clock advances. Two stalled clocks agree (1.0); only
/// one stalling is infinite drift.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn drift_ratio(delta_stored: u64, delta_current: u64) -> f64 {
    match (delta_stored, delta_current) {
        (0, 0) => 1.0,
        (_, 0) => f64::INFINITY,
        (stored, current) => stored as f64 / current as f64,
    }
}

/// A failed observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drift {
    pub ratio: f64,
    pub tolerance: f64,
    pub delta_stored: u64,
    pub delta_current: u64,
}

/// Tracks the last pair of clock samples across events.
#[derive(Debug, Clone)]
pub struct DriftChecker {
    tolerance: f64,
    last: Option<(u64, u64)>,
}

impl DriftChecker {
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            last: None,
        }
    }

    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Record the samples of event `event_index` (0-based) and check them
    /// against the previous event's samples.
    ///
    /// The last-seen pair is updated whether or not the check passes.
    ///
    /// # Errors
    ///
    /// Returns [`Drift`] when the ratio falls outside the tolerance band.
    pub fn observe(&mut self, event_index: u64, stored: u64, current: u64) -> Result<(), Drift> {
        let previous = self.last.replace((stored, current));
        if event_index < SEED_EVENTS {
            return Ok(());
        }
        let Some((last_stored, last_current)) = previous else {
            return Ok(());
        };

        let delta_stored = clock_delta(last_stored, stored);
        let delta_current = clock_delta(last_current, current);
        let ratio = drift_ratio(delta_stored, delta_current);
        if (ratio - 1.0).abs() > self.tolerance || ratio.is_nan() {
            return Err(Drift {
                ratio,
                tolerance: self.tolerance,
                delta_stored,
                delta_current,
            });
        }
        Ok(())
    }
}

impl Default for DriftChecker {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

//! Event segmentation over the ordered hit row stream.
//!
//! The input is grouped by `event_id` in contiguous runs. Each run becomes
//! one event: an [`EventRecord`] plus a [`HitGroup`]. An event is finalized
//! the moment the next distinct id shows up, or when the stream ends.
//!
//! # State machine
//!
//! ```text
//! AwaitingFirstEvent --first row--> Accumulating(id)
//! Accumulating(id)   --row with id' != id--> finalize id, then
//!                        cap reached? -> Finished
//!                        otherwise    -> Accumulating(id')
//! Accumulating(id)   --end of stream--> finalize id
//! ```
//!
//! The first event is never finalized before a row of it has been seen, so
//! no empty placeholder event is ever emitted ahead of event 0.
//!
//! # Modes
//!
//! Whether event records are authored from the hit stream or pulled from an
//! existing Event table is decided once, by the [`EventStrategy`] passed to
//! [`Segmenter::new`]. The row loop itself is mode-agnostic.
//!
//! Chunk boundaries are invisible here: the open event, the last event id,
//! and the drift checker all live on the [`Segmenter`] for the whole run.

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::companion::CompanionEvents;
use crate::drift::DriftChecker;
use crate::error::{ConvertError, RowPosition};
use crate::model::{EventRecord, FlatHitRow, HitGroup, MAX_HITS};
use crate::sink::{Alignment, Emitter, EventSink};
use crate::source::{Chunk, HitSource};
use crate::validate::{Classification, HitRejection, classify};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// How event records come into being.
pub trait EventStrategy {
    /// Whether records travel to the sink with their hit groups.
    fn alignment(&self) -> Alignment;

    /// Maximum number of events to open. `None` means unbounded.
    fn event_cap(&self) -> Option<u64>;

    /// A new event with index `index` (0-based) and frame number
    /// `frame_number` has been opened by `row`.
    ///
    /// Returns the record to emit with the event's hit group, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the event cannot be accepted.
    fn open_event(
        &mut self,
        index: u64,
        frame_number: u64,
        row: &FlatHitRow,
        at: RowPosition,
    ) -> Result<Option<EventRecord>, ConvertError>;

    /// The stream is done and `finalized` events were emitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the run is incomplete.
    fn finish(&self, finalized: u64) -> Result<(), ConvertError>;
}

/// Author mode: the hit stream defines the Event table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorStrategy {
    max_events: Option<u64>,
}

impl AuthorStrategy {
    #[must_use]
    pub const fn new(max_events: Option<u64>) -> Self {
        Self { max_events }
    }

    /// Build from a raw event limit where 0 means unbounded.
    #[must_use]
    pub const fn with_limit(max_events: u64) -> Self {
        if max_events == 0 {
            Self::new(None)
        } else {
            Self::new(Some(max_events))
        }
    }
}

impl EventStrategy for AuthorStrategy {
    fn alignment(&self) -> Alignment {
        Alignment::WithRecords
    }

    fn event_cap(&self) -> Option<u64> {
        self.max_events
    }

    fn open_event(
        &mut self,
        _index: u64,
        frame_number: u64,
        row: &FlatHitRow,
        _at: RowPosition,
    ) -> Result<Option<EventRecord>, ConvertError> {
        Ok(Some(EventRecord::author(row, frame_number)))
    }

    fn finish(&self, _finalized: u64) -> Result<(), ConvertError> {
        Ok(())
    }
}

/// Verifier mode: every event must match the next record of an existing
/// Event table.
#[derive(Debug)]
pub struct VerifierStrategy<C> {
    companion: C,
    available: u64,
    checker: Option<DriftChecker>,
}

impl<C: CompanionEvents> VerifierStrategy<C> {
    /// Verify against `companion`, optionally checking clock drift.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::CompanionEmpty`] if there is nothing to
    /// verify against.
    pub fn new(companion: C, checker: Option<DriftChecker>) -> Result<Self, ConvertError> {
        let available = companion.len();
        if available == 0 {
            return Err(ConvertError::CompanionEmpty);
        }
        Ok(Self {
            companion,
            available,
            checker,
        })
    }
}

impl<C: CompanionEvents> EventStrategy for VerifierStrategy<C> {
    fn alignment(&self) -> Alignment {
        Alignment::HitsOnly
    }

    fn event_cap(&self) -> Option<u64> {
        Some(self.available)
    }

    fn open_event(
        &mut self,
        index: u64,
        frame_number: u64,
        row: &FlatHitRow,
        at: RowPosition,
    ) -> Result<Option<EventRecord>, ConvertError> {
        let Some(record) = self.companion.next_record() else {
            return Err(ConvertError::CompanionExhausted {
                at,
                event_id: row.event_id,
            });
        };
        if record.frame_number != frame_number {
            return Err(ConvertError::FrameMismatch {
                at,
                frame_number: record.frame_number,
                event_id: row.event_id,
            });
        }
        if let Some(checker) = self.checker.as_mut() {
            checker
                .observe(index, record.timestamp, u64::from(row.trigger_timestamp))
                .map_err(|drift| ConvertError::TimestampDrift {
                    at,
                    ratio: drift.ratio,
                    tolerance: drift.tolerance,
                })?;
        }
        Ok(None)
    }

    fn finish(&self, finalized: u64) -> Result<(), ConvertError> {
        if finalized < self.available {
            return Err(ConvertError::MissingEvents {
                missing: self.available - finalized,
                finalized,
                available: self.available,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// Whether the caller should keep pulling chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The event cap was reached; further rows are not consumed.
    Stop,
}

/// Counters for one segmentation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    /// Events handed to the sink.
    pub events: u64,
    /// Hits handed to the sink.
    pub hits: u64,
    /// Rows classified, sentinels included.
    pub rows: u64,
    /// Sentinel rows that contributed no hit.
    pub ignored_rows: u64,
    pub chunks: u64,
    /// Authored records carrying the unknown-word flag.
    pub invalid_events: u64,
    /// `true` if the event cap cut the stream short.
    pub stopped_by_cap: bool,
}

#[derive(Debug)]
struct OpenEvent {
    event_id: i64,
    record: Option<EventRecord>,
    hits: HitGroup,
}

#[derive(Debug)]
enum State {
    AwaitingFirstEvent,
    Accumulating(OpenEvent),
    Finished,
}

/// Groups rows into events and hands finished events to a sink.
#[derive(Debug)]
pub struct Segmenter<S, K> {
    strategy: S,
    emitter: Emitter<K>,
    state: State,
    require_monotonic: bool,
    last_event_id: Option<i64>,
    opened: u64,
    summary: SegmentSummary,
}

impl<S: EventStrategy, K: EventSink> Segmenter<S, K> {
    #[must_use]
    pub fn new(strategy: S, sink: K) -> Self {
        let emitter = Emitter::new(sink, strategy.alignment()).with_limit(strategy.event_cap());
        Self {
            strategy,
            emitter,
            state: State::AwaitingFirstEvent,
            require_monotonic: true,
            last_event_id: None,
            opened: 0,
            summary: SegmentSummary::default(),
        }
    }

    /// Require event ids to increase strictly from one event to the next
    /// (on by default). Without it, a non-contiguous stream is silently
    /// split into more events than it has ids.
    #[must_use]
    pub const fn require_monotonic(mut self, on: bool) -> Self {
        self.require_monotonic = on;
        self
    }

    /// Number of events opened so far.
    #[must_use]
    pub const fn opened(&self) -> u64 {
        self.opened
    }

    /// Returns `true` once the event cap has stopped consumption.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Drive `source` to the end (or to the event cap) and finish.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConvertError`] raised by the source, a row, the
    /// strategy, or the sink.
    pub fn run<H: HitSource + ?Sized>(
        mut self,
        source: &mut H,
    ) -> Result<(SegmentSummary, K), ConvertError> {
        while let Some(chunk) = source.next_chunk()? {
            if self.push_chunk(&chunk)? == Flow::Stop {
                break;
            }
        }
        self.finish()
    }

    /// Consume one chunk. State carries over to the next call.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] on the first fatal row.
    pub fn push_chunk(&mut self, chunk: &Chunk) -> Result<Flow, ConvertError> {
        if self.is_finished() {
            return Ok(Flow::Stop);
        }
        self.summary.chunks += 1;

        for (index, row) in chunk.rows.iter().enumerate() {
            let at = RowPosition::new(chunk.index, index);
            if self.starts_event(row) && !self.begin_event(row, at)? {
                return Ok(Flow::Stop);
            }
            self.consume_row(row, at)?;
        }
        Ok(Flow::Continue)
    }

    /// Finalize the open event, run the completeness check, and flush.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the sink fails or, in Verifier mode, if
    /// fewer events were finalized than the Event table holds.
    pub fn finish(mut self) -> Result<(SegmentSummary, K), ConvertError> {
        if let State::Accumulating(open) = std::mem::replace(&mut self.state, State::Finished) {
            self.emitter.emit(open.record.as_ref(), &open.hits)?;
        }
        let finalized = self.emitter.emitted();
        self.strategy.finish(finalized)?;

        let mut summary = self.summary;
        summary.events = finalized;
        summary.hits = self.emitter.hits_written();
        if summary.invalid_events > 0 {
            warn!(
                invalid = summary.invalid_events,
                events = summary.events,
                "events flagged with unknown data words"
            );
        }
        let sink = self.emitter.finish()?;
        Ok((summary, sink))
    }

    fn starts_event(&self, row: &FlatHitRow) -> bool {
        match &self.state {
            State::AwaitingFirstEvent => true,
            State::Accumulating(open) => open.event_id != row.event_id,
            State::Finished => false,
        }
    }

    /// Close the current event and open one for `row`. Returns `false` if
    /// the event cap stops the stream instead.
    fn begin_event(&mut self, row: &FlatHitRow, at: RowPosition) -> Result<bool, ConvertError> {
        let mut hits = match std::mem::replace(&mut self.state, State::AwaitingFirstEvent) {
            State::Accumulating(open) => {
                self.emitter.emit(open.record.as_ref(), &open.hits)?;
                self.last_event_id = Some(open.event_id);
                open.hits
            }
            State::AwaitingFirstEvent | State::Finished => HitGroup::new(),
        };

        if let Some(cap) = self.strategy.event_cap() {
            if self.opened >= cap {
                info!(
                    max_events = cap,
                    chunk = at.chunk,
                    index = at.index,
                    "reached max. events"
                );
                self.state = State::Finished;
                self.summary.stopped_by_cap = true;
                return Ok(false);
            }
        }

        let frame_number = u64::try_from(row.event_id).map_err(|_| ConvertError::NegativeEventId {
            at,
            event_id: row.event_id,
        })?;
        if self.require_monotonic {
            if let Some(previous) = self.last_event_id {
                if row.event_id <= previous {
                    return Err(ConvertError::EventOrder {
                        at,
                        previous,
                        found: row.event_id,
                    });
                }
            }
        }

        let record = self.strategy.open_event(self.opened, frame_number, row, at)?;
        if record.is_some_and(|r| r.invalid) {
            self.summary.invalid_events += 1;
            debug!(frame_number, "event flagged invalid");
        }
        trace!(event_id = row.event_id, index = self.opened, "open event");

        hits.clear();
        self.state = State::Accumulating(OpenEvent {
            event_id: row.event_id,
            record,
            hits,
        });
        self.opened += 1;
        Ok(true)
    }

    fn consume_row(&mut self, row: &FlatHitRow, at: RowPosition) -> Result<(), ConvertError> {
        let State::Accumulating(open) = &mut self.state else {
            return Err(ConvertError::Internal("row arrived outside an open event"));
        };
        self.summary.rows += 1;

        match classify(row, open.hits.len()) {
            Classification::Ignore => {
                self.summary.ignored_rows += 1;
                Ok(())
            }
            Classification::Accept(hit) => open
                .hits
                .push(hit)
                .map_err(|_| ConvertError::TooManyHits { at, max: MAX_HITS }),
            Classification::Fatal(HitRejection::TooManyHits) => {
                Err(ConvertError::TooManyHits { at, max: MAX_HITS })
            }
            Classification::Fatal(HitRejection::OutOfRange { column, row }) => {
                Err(ConvertError::HitOutOfRange { at, column, row })
            }
        }
    }
}

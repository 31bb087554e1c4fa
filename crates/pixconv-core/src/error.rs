use std::fmt;

use crate::source::SourceError;
use crate::store::StoreError;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalid,
    ConfigParseError,
    InputUnreadable,
    MalformedInput,
    ChunkTooLarge,
    HitCapExceeded,
    HitOutOfRange,
    EventOrder,
    CompanionExists,
    CompanionMissing,
    CompanionEmpty,
    PlaneExists,
    StoreMissing,
    FrameMismatch,
    CompanionExhausted,
    TimestampDrift,
    MissingEvents,
    OutputWriteFailed,
    LockContention,
    EventCapExceeded,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InputUnreadable => "E2001",
            Self::MalformedInput => "E2002",
            Self::ChunkTooLarge => "E2003",
            Self::HitCapExceeded => "E2004",
            Self::HitOutOfRange => "E2005",
            Self::EventOrder => "E2006",
            Self::CompanionExists => "E3001",
            Self::CompanionMissing => "E3002",
            Self::CompanionEmpty => "E3003",
            Self::PlaneExists => "E3004",
            Self::StoreMissing => "E3005",
            Self::FrameMismatch => "E4001",
            Self::CompanionExhausted => "E4002",
            Self::TimestampDrift => "E4003",
            Self::MissingEvents => "E4004",
            Self::OutputWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::EventCapExceeded => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Invalid conversion settings",
            Self::ConfigParseError => "Config file parse error",
            Self::InputUnreadable => "Input hit table unreadable",
            Self::MalformedInput => "Malformed input chunk",
            Self::ChunkTooLarge => "Chunk exceeds buffer capacity",
            Self::HitCapExceeded => "Too many hits in one event",
            Self::HitOutOfRange => "Hit coordinate out of range",
            Self::EventOrder => "Event numbers out of order",
            Self::CompanionExists => "Event table already exists",
            Self::CompanionMissing => "Event table not found",
            Self::CompanionEmpty => "Event table is empty",
            Self::PlaneExists => "Plane already exists",
            Self::StoreMissing => "Output store not found",
            Self::FrameMismatch => "Event number mismatch",
            Self::CompanionExhausted => "Event table exhausted",
            Self::TimestampDrift => "Timestamp drift detected",
            Self::MissingEvents => "Missing events",
            Self::OutputWriteFailed => "Output write failed",
            Self::LockContention => "Lock contention",
            Self::EventCapExceeded => "Event cap exceeded",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid => Some("Check the plane name and timestamp tolerance."),
            Self::ConfigParseError => Some("Fix syntax in the config TOML file and retry."),
            Self::InputUnreadable => Some("Check that the input path exists and is readable."),
            Self::MalformedInput | Self::ChunkTooLarge | Self::HitOutOfRange => {
                Some("The input is corrupt; regenerate the hit table from raw data.")
            }
            Self::HitCapExceeded => None,
            Self::EventOrder => Some(
                "Sort the hit table by event number, or pass --allow-unordered to skip the check.",
            ),
            Self::CompanionExists => {
                Some("Use --verify to add a plane against the existing event table.")
            }
            Self::CompanionMissing | Self::CompanionEmpty => {
                Some("Convert the reference plane first without --verify.")
            }
            Self::PlaneExists => Some("Choose a different --plane name."),
            Self::StoreMissing => Some("Use --mode create for a new output store."),
            Self::FrameMismatch | Self::CompanionExhausted | Self::MissingEvents => {
                Some("The planes were not recorded together; check that the inputs belong to the same run.")
            }
            Self::TimestampDrift => Some(
                "The two clocks diverged; rerun without --check-timestamp or widen --tolerance.",
            ),
            Self::OutputWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => {
                Some("Retry after the other pixconv process releases the output store.")
            }
            Self::EventCapExceeded | Self::InternalUnexpected => {
                Some("Retry once. If persistent, report a bug with logs.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Location of a row in the chunked input stream.
///
/// `chunk` is 1-based (matching progress logs), `index` is the 0-based row
/// offset within that chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowPosition {
    pub chunk: usize,
    pub index: usize,
}

impl RowPosition {
    #[must_use]
    pub const fn new(chunk: usize, index: usize) -> Self {
        Self { chunk, index }
    }
}

impl fmt::Display for RowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at chunk {} index {}", self.chunk, self.index)
    }
}

/// Every way a conversion can fail. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid settings: {0}")]
    InvalidConfig(String),

    #[error("found invalid hit (column {column}, row {row}) {at}")]
    HitOutOfRange {
        at: RowPosition,
        column: u8,
        row: u16,
    },

    #[error("reached max hits limit of {max} {at}")]
    TooManyHits { at: RowPosition, max: usize },

    #[error("event {found} does not follow event {previous} {at}")]
    EventOrder {
        at: RowPosition,
        previous: i64,
        found: i64,
    },

    #[error("negative event number {event_id} {at}")]
    NegativeEventId { at: RowPosition, event_id: i64 },

    #[error("event number mismatch: event table has frame {frame_number}, hit stream has event {event_id} {at}")]
    FrameMismatch {
        at: RowPosition,
        frame_number: u64,
        event_id: i64,
    },

    #[error("event table is empty")]
    CompanionEmpty,

    #[error("event table has no record left for event {event_id} {at}")]
    CompanionExhausted { at: RowPosition, event_id: i64 },

    #[error("timestamp drift ratio {ratio:.6} outside 1 ± {tolerance} {at}")]
    TimestampDrift {
        at: RowPosition,
        ratio: f64,
        tolerance: f64,
    },

    #[error("missing {missing} events: finalized {finalized} of {available} in the event table")]
    MissingEvents {
        missing: u64,
        finalized: u64,
        available: u64,
    },

    #[error("hit group of {len} hits exceeds the limit of {max}")]
    HitGroupOverflow { len: usize, max: usize },

    #[error("emitting event {attempted} exceeds the cap of {limit} events")]
    EventCapExceeded { attempted: u64, limit: u64 },

    #[error("sink alignment violated: {0}")]
    Alignment(&'static str),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl ConvertError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Source(err) => err.code(),
            Self::Store(err) => err.code(),
            Self::InvalidConfig(_) => ErrorCode::ConfigInvalid,
            Self::HitOutOfRange { .. } => ErrorCode::HitOutOfRange,
            Self::TooManyHits { .. } | Self::HitGroupOverflow { .. } => ErrorCode::HitCapExceeded,
            Self::EventOrder { .. } | Self::NegativeEventId { .. } => ErrorCode::EventOrder,
            Self::FrameMismatch { .. } => ErrorCode::FrameMismatch,
            Self::CompanionEmpty => ErrorCode::CompanionEmpty,
            Self::CompanionExhausted { .. } => ErrorCode::CompanionExhausted,
            Self::TimestampDrift { .. } => ErrorCode::TimestampDrift,
            Self::MissingEvents { .. } => ErrorCode::MissingEvents,
            Self::EventCapExceeded { .. } => ErrorCode::EventCapExceeded,
            Self::Alignment(_) | Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

//! Conversion driver: hit table in, one plane of an output store out.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConvertConfig;
use crate::drift::DriftChecker;
use crate::error::ConvertError;
use crate::segment::{AuthorStrategy, EventStrategy, SegmentSummary, Segmenter, VerifierStrategy};
use crate::sink::{EventSink, NullSink};
use crate::source::{ChunkFileReader, HitSource};
use crate::store::{OutputStore, StoreRequest, WriteMode};

/// Which side of the Event table a conversion was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Wrote the Event table.
    Author,
    /// Checked against an existing Event table.
    Verify,
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub role: Role,
    pub plane: String,
    pub output: PathBuf,
    pub write_mode: WriteMode,
    #[serde(flatten)]
    pub summary: SegmentSummary,
    pub elapsed_ms: u64,
}

impl ConversionReport {
    /// Number of events written, the figure callers usually want.
    #[must_use]
    pub const fn events(&self) -> u64 {
        self.summary.events
    }
}

/// Convert `config.input` into plane `config.plane` of `config.output`.
///
/// In author mode the Event table is written alongside the plane's Hits
/// table. Otherwise every event is checked against the existing Event
/// table and only hits are written. On error, whatever was already written
/// stays on disk.
///
/// # Errors
///
/// Returns [`ConvertError`] for invalid settings, unreadable or malformed
/// input, a store that does not fit the request, and every fatal condition
/// raised while segmenting.
pub fn convert(config: &ConvertConfig) -> Result<ConversionReport, ConvertError> {
    config
        .validate()
        .map_err(|err| ConvertError::InvalidConfig(err.to_string()))?;

    let started = Instant::now();
    let role = if config.author_mode {
        Role::Author
    } else {
        Role::Verify
    };
    info!(
        input = %config.input.display(),
        output = %config.output.display(),
        plane = %config.plane,
        ?role,
        "conversion started"
    );

    let mut source = ChunkFileReader::open(&config.input)?;
    let store = OutputStore::prepare(&StoreRequest {
        root: &config.output,
        plane: &config.plane,
        mode: config.write_mode,
        author: config.author_mode,
        diagnostics: config.diagnostics,
        lock_timeout: config.lock_timeout(),
    })?;

    for setting in ignored_settings(config) {
        warn!(setting, ?role, "setting has no effect in this role, ignoring");
    }

    let summary = if config.author_mode {
        let strategy = AuthorStrategy::new(config.event_limit());
        segment(strategy, store.sink()?, &mut source, config.require_monotonic)?
    } else {
        let checker = config
            .check_timestamp
            .then(|| DriftChecker::new(config.timestamp_tolerance));
        let strategy = VerifierStrategy::new(store.event_table()?, checker)?;
        segment(strategy, store.sink()?, &mut source, config.require_monotonic)?
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        events = summary.events,
        hits = summary.hits,
        chunks = summary.chunks,
        elapsed_ms,
        "conversion finished"
    );
    Ok(ConversionReport {
        role,
        plane: config.plane.clone(),
        output: config.output.clone(),
        write_mode: config.write_mode,
        summary,
        elapsed_ms,
    })
}

/// Settings that `config` sets but its role does not use. The drift check
/// needs an existing Event table, and a verified plane takes its event
/// count from that table.
fn ignored_settings(config: &ConvertConfig) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if config.author_mode {
        if config.check_timestamp {
            ignored.push("check_timestamp");
        }
    } else if config.event_limit().is_some() {
        ignored.push("max_events");
    }
    ignored
}

/// Segment a hit table in author mode without writing anything.
///
/// # Errors
///
/// Returns [`ConvertError`] for the same input faults [`convert`] reports.
pub fn inspect(input: &Path, require_monotonic: bool) -> Result<SegmentSummary, ConvertError> {
    let mut source = ChunkFileReader::open(input)?;
    segment(AuthorStrategy::new(None), NullSink, &mut source, require_monotonic)
}

fn segment<S, K, H>(
    strategy: S,
    sink: K,
    source: &mut H,
    require_monotonic: bool,
) -> Result<SegmentSummary, ConvertError>
where
    S: EventStrategy,
    K: EventSink,
    H: HitSource,
{
    let (summary, _sink) = Segmenter::new(strategy, sink)
        .require_monotonic(require_monotonic)
        .run(source)?;
    Ok(summary)
}

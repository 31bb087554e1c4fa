//! Output store management.
//!
//! A store is a directory holding one Event table shared by every plane and
//! one Hits table per plane. Hit groups are matched to event records by
//! position only: line N of a plane's `hits.jsonl` belongs to record N of
//! `events.jsonl`.
//!
//! # Directory Layout
//!
//! ```text
//! <output>/
//!   events.jsonl        # Event table, written by the first (author) plane
//!   Plane0/hits.jsonl   # Hits table of the author plane
//!   Plane1/hits.jsonl   # Hits table of a plane verified against events.jsonl
//!   .lock               # advisory lock held during conversion
//! ```
//!
//! # Invariants
//!
//! - The Event table is written once, by the conversion that authors it.
//! - A plane namespace is never reused; converting into an existing plane
//!   is refused.
//! - A single writer at a time, enforced by [`StoreLock`].

mod table;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ErrorCode;
use crate::lock::{LockError, StoreLock};

pub use table::{
    DiagnosticColumns, EventTable, HitColumns, TableSink, events_header, read_hit_columns,
};

/// File name of the Event table inside the store root.
pub const EVENTS_FILE: &str = "events.jsonl";

/// File name of a plane's Hits table inside its namespace directory.
pub const HITS_FILE: &str = "hits.jsonl";

/// File name of the advisory lock.
pub const LOCK_FILE: &str = ".lock";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while preparing, reading, or writing an output store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("output store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid event record on line {line} of {path}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode output row: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("event table already exists at {0}")]
    CompanionExists(PathBuf),

    #[error("event table not found at {0}")]
    CompanionMissing(PathBuf),

    #[error("plane `{plane}` already exists at {path}")]
    PlaneExists { plane: String, path: PathBuf },

    #[error("output store {0} does not exist")]
    StoreMissing(PathBuf),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } | Self::Encode(_) => ErrorCode::OutputWriteFailed,
            Self::Decode { .. } => ErrorCode::MalformedInput,
            Self::CompanionExists(_) => ErrorCode::CompanionExists,
            Self::CompanionMissing(_) => ErrorCode::CompanionMissing,
            Self::PlaneExists { .. } => ErrorCode::PlaneExists,
            Self::StoreMissing(_) => ErrorCode::StoreMissing,
            Self::Lock(err) => err.code(),
        }
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// How the store directory itself is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Create the store directory if needed.
    #[default]
    Create,
    /// The store directory must already exist.
    Append,
}

impl WriteMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Append => "append",
        }
    }
}

/// Paths inside an output store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.root.join(EVENTS_FILE)
    }

    #[must_use]
    pub fn plane_dir(&self, plane: &str) -> PathBuf {
        self.root.join(plane)
    }

    #[must_use]
    pub fn hits_path(&self, plane: &str) -> PathBuf {
        self.plane_dir(plane).join(HITS_FILE)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }
}

// ---------------------------------------------------------------------------
// OutputStore
// ---------------------------------------------------------------------------

/// What a conversion is about to do to the store.
#[derive(Debug, Clone)]
pub struct StoreRequest<'a> {
    pub root: &'a Path,
    pub plane: &'a str,
    pub mode: WriteMode,
    /// `true` when this conversion writes the Event table.
    pub author: bool,
    pub diagnostics: bool,
    pub lock_timeout: Duration,
}

/// A store prepared for one conversion. Holds the store lock until dropped.
#[derive(Debug)]
pub struct OutputStore {
    layout: StoreLayout,
    plane: String,
    author: bool,
    diagnostics: bool,
    _lock: StoreLock,
}

impl OutputStore {
    /// Open the store, take its lock, and check that the request fits what
    /// is already on disk.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StoreMissing`] in append mode without a store.
    /// - [`StoreError::Lock`] if another writer holds the store.
    /// - [`StoreError::CompanionExists`] when authoring over an existing
    ///   Event table, [`StoreError::CompanionMissing`] when verifying
    ///   without one.
    /// - [`StoreError::PlaneExists`] if the plane namespace is taken.
    pub fn prepare(request: &StoreRequest<'_>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(request.root);
        match request.mode {
            WriteMode::Create => {
                fs::create_dir_all(layout.root()).map_err(StoreError::io(layout.root()))?;
            }
            WriteMode::Append => {
                if !layout.root().is_dir() {
                    return Err(StoreError::StoreMissing(layout.root().to_path_buf()));
                }
            }
        }

        let lock = StoreLock::acquire(&layout.lock_path(), request.lock_timeout)?;

        let events = layout.events_path();
        match (request.author, events.exists()) {
            (true, true) => return Err(StoreError::CompanionExists(events)),
            (false, false) => return Err(StoreError::CompanionMissing(events)),
            _ => {}
        }

        let plane_dir = layout.plane_dir(request.plane);
        if plane_dir.exists() {
            return Err(StoreError::PlaneExists {
                plane: request.plane.to_string(),
                path: plane_dir,
            });
        }

        info!(
            store = %layout.root().display(),
            plane = request.plane,
            mode = request.mode.as_str(),
            author = request.author,
            "output store prepared"
        );
        Ok(Self {
            layout,
            plane: request.plane.to_string(),
            author: request.author,
            diagnostics: request.diagnostics,
            _lock: lock,
        })
    }

    #[must_use]
    pub fn plane(&self) -> &str {
        &self.plane
    }

    /// Load the Event table this plane is verified against.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the table cannot be read or decoded.
    pub fn event_table(&self) -> Result<EventTable, StoreError> {
        EventTable::load(&self.layout.events_path())
    }

    /// Create the plane namespace and open its writers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a directory or file cannot be created.
    pub fn sink(&self) -> Result<TableSink, StoreError> {
        let plane_dir = self.layout.plane_dir(&self.plane);
        fs::create_dir(&plane_dir).map_err(StoreError::io(&plane_dir))?;
        let events = self.author.then(|| self.layout.events_path());
        TableSink::create(
            &self.layout.hits_path(&self.plane),
            events.as_deref(),
            self.diagnostics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request<'a>(
        root: &'a Path,
        plane: &'static str,
        mode: WriteMode,
        author: bool,
    ) -> StoreRequest<'a> {
        StoreRequest {
            root,
            plane,
            mode,
            author,
            diagnostics: false,
            lock_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn layout_paths() {
        let layout = StoreLayout::new("/data/run7");
        assert_eq!(layout.events_path(), PathBuf::from("/data/run7/events.jsonl"));
        assert_eq!(layout.hits_path("Plane2"), PathBuf::from("/data/run7/Plane2/hits.jsonl"));
        assert_eq!(layout.lock_path(), PathBuf::from("/data/run7/.lock"));
    }

    #[test]
    fn create_mode_makes_the_root() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("out");
        let store = OutputStore::prepare(&request(&root, "Plane0", WriteMode::Create, true))
            .expect("prepare");
        assert!(root.is_dir());
        assert_eq!(store.plane(), "Plane0");
    }

    #[test]
    fn append_mode_requires_existing_store() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("absent");
        let err = OutputStore::prepare(&request(&root, "Plane0", WriteMode::Append, true))
            .expect_err("missing store");
        assert!(matches!(err, StoreError::StoreMissing(_)));
        assert_eq!(err.code(), ErrorCode::StoreMissing);
    }

    #[test]
    fn author_refuses_existing_event_table() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join(EVENTS_FILE), "").expect("seed");
        let err = OutputStore::prepare(&request(tmp.path(), "Plane0", WriteMode::Append, true))
            .expect_err("exists");
        assert_eq!(err.code(), ErrorCode::CompanionExists);
    }

    #[test]
    fn verifier_requires_event_table() {
        let tmp = TempDir::new().expect("tempdir");
        let err = OutputStore::prepare(&request(tmp.path(), "Plane1", WriteMode::Append, false))
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::CompanionMissing);
    }

    #[test]
    fn plane_namespace_is_not_reused() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join(EVENTS_FILE), "").expect("seed");
        fs::create_dir(tmp.path().join("Plane1")).expect("plane");
        let err = OutputStore::prepare(&request(tmp.path(), "Plane1", WriteMode::Append, false))
            .expect_err("taken");
        assert!(matches!(err, StoreError::PlaneExists { ref plane, .. } if plane == "Plane1"));
    }

    #[test]
    fn second_writer_times_out_on_lock() {
        let tmp = TempDir::new().expect("tempdir");
        let _first = OutputStore::prepare(&request(tmp.path(), "Plane0", WriteMode::Create, true))
            .expect("first");
        let err = OutputStore::prepare(&request(tmp.path(), "Plane1", WriteMode::Create, true))
            .expect_err("locked");
        assert_eq!(err.code(), ErrorCode::LockContention);
    }

    #[test]
    fn write_mode_parses_lowercase() {
        let mode: WriteMode = serde_json::from_str("\"append\"").expect("parse");
        assert_eq!(mode, WriteMode::Append);
        assert_eq!(WriteMode::default().as_str(), "create");
    }
}

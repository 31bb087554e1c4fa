//! Chunked hit row sources.
//!
//! A source hands out the input table one chunk at a time. Chunking is an
//! I/O detail: the segmenter treats the concatenation of all chunks as one
//! ordered stream.
//!
//! - [`HitSource`]: the pull contract.
//! - [`ChunkFileReader`]: JSON Lines hit tables on disk.
//! - [`MemorySource`]: chunks already held in memory.

pub mod jsonl;

use std::collections::VecDeque;
use std::io;

use crate::error::ErrorCode;
use crate::model::FlatHitRow;

pub use jsonl::{ChunkFileReader, encode_chunk};

/// Largest chunk a source will accept.
pub const BUFFER_CAPACITY: usize = 100_000;

/// Errors raised while pulling chunks.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read hit table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid chunk on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("chunk {chunk}: column `{column}` has {found} entries, expected {expected}")]
    ColumnLength {
        chunk: usize,
        column: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("reached max buffer size limit at chunk {chunk}: {rows} rows, capacity {capacity}")]
    ChunkTooLarge {
        chunk: usize,
        rows: usize,
        capacity: usize,
    },
}

impl SourceError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::InputUnreadable,
            Self::Decode { .. } | Self::ColumnLength { .. } => ErrorCode::MalformedInput,
            Self::ChunkTooLarge { .. } => ErrorCode::ChunkTooLarge,
        }
    }
}

/// One chunk of input rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position of the chunk in the stream.
    pub index: usize,
    pub rows: Vec<FlatHitRow>,
}

/// Pull contract for chunked hit tables.
pub trait HitSource {
    /// Return the next chunk, or `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the chunk cannot be read or is larger
    /// than the source's capacity.
    fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceError>;
}

/// Reject a chunk whose declared size exceeds `capacity`.
///
/// # Errors
///
/// Returns [`SourceError::ChunkTooLarge`] when `rows > capacity`.
pub fn check_capacity(chunk: usize, rows: usize, capacity: usize) -> Result<(), SourceError> {
    if rows > capacity {
        return Err(SourceError::ChunkTooLarge {
            chunk,
            rows,
            capacity,
        });
    }
    Ok(())
}

/// A source over chunks that are already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    chunks: VecDeque<Vec<FlatHitRow>>,
    capacity: usize,
    served: usize,
}

impl MemorySource {
    /// Serve `chunks` in order with the default [`BUFFER_CAPACITY`].
    #[must_use]
    pub fn new(chunks: Vec<Vec<FlatHitRow>>) -> Self {
        Self {
            chunks: chunks.into(),
            capacity: BUFFER_CAPACITY,
            served: 0,
        }
    }

    /// Split a flat row list into chunks of at most `chunk_size` rows.
    ///
    /// A `chunk_size` of 0 is treated as 1.
    #[must_use]
    pub fn chunked(rows: &[FlatHitRow], chunk_size: usize) -> Self {
        let chunks = rows
            .chunks(chunk_size.max(1))
            .map(<[FlatHitRow]>::to_vec)
            .collect();
        Self::new(chunks)
    }

    /// Override the per-chunk capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl HitSource for MemorySource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceError> {
        let Some(rows) = self.chunks.pop_front() else {
            return Ok(None);
        };
        self.served += 1;
        check_capacity(self.served, rows.len(), self.capacity)?;
        Ok(Some(Chunk {
            index: self.served,
            rows,
        }))
    }
}

//! Error taxonomy. Per-record and per-entry errors are recovered locally by the run;
//! `RunError` aborts the run and means no manifest was written.

use std::path::PathBuf;
use thiserror::Error;

/// Why an input line could not become a `Record`.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("invalid id `{0}`")]
    InvalidId(String),

    #[error("unrecognized timestamp `{0}`")]
    Timestamp(String),
}

/// Why a post's thread could not be stored as an archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("payload contains a NUL byte at offset {offset}")]
    NulByte { offset: usize },

    #[error("comment {index} contains the record separator")]
    Separator { index: usize },

    #[error("payload is {bytes} bytes, entry limit is {limit}")]
    Oversized { bytes: usize, limit: usize },
}

/// Run-level failure. The whole run must be retried from the start of the stream.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("record source unavailable")]
    SourceUnavailable(#[source] anyhow::Error),

    #[error("failed writing archive output {}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed writing manifest {}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl RunError {
    /// Transient input failures are worth retrying; output failures usually are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RunError::SourceUnavailable(_))
    }
}

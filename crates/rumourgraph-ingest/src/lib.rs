//! Thread ingestion for Rumourgraph
//!
//! Turns a PHEME-style dataset of raw tweet records into flat per-thread
//! tables:
//! - `record`: one raw JSON record → one normalized [`MessageRecord`]
//! - `table`: dataset walk, rumour labelling, thread-table persistence
//!
//! Nothing in this crate knows about reply trees or graphs; the flat
//! [`ThreadTable`] is the hand-off point to `rumourgraph-graph`.

pub mod record;
pub mod table;

use std::path::PathBuf;

pub use record::{normalize_record, AuthorRef, MessageRecord, NORMALIZED_TIME_FORMAT};
pub use table::{
    build_tables, build_thread_table, discover_threads, read_table, read_tables, write_table,
    ThreadDir, ThreadTable, RUMOUR_LABEL,
};

/// Errors raised while reading raw records and building thread tables.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A record is missing a required field or carries an unparseable value.
    /// Recovered locally: the record is skipped.
    #[error("malformed record {locator}: {reason}")]
    MalformedRecord { locator: String, reason: String },

    /// Every record of a thread failed normalization.
    #[error("thread {thread_id} has no usable records")]
    EmptyThread { thread_id: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("dataset walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl IngestError {
    pub(crate) fn malformed(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

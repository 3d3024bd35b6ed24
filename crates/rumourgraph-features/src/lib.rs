//! Feature extraction over a rumour graph
//!
//! - `extractor`: one [`ExtractionRun`] per call to [`extract_all`]; owns the
//!   propagation/author/mention/engagement caches for that run only
//! - `text`: token, link, hashtag and sentiment features of a message text
//! - `table`: the flat [`FeatureTable`] and its on-disk formats
//! - `authors`: per-author activity and betweenness report
//!
//! The graph is only ever read here.

pub mod authors;
pub mod extractor;
pub mod table;
pub mod text;

use std::path::PathBuf;

pub use authors::{author_report, betweenness_centrality, AuthorReport, AuthorSummary};
pub use extractor::{extract_all, Engagement, ExtractionRun};
pub use table::{FeatureRow, FeatureTable, OutputFormat, FEATURE_COLUMNS};
pub use text::{analyze_text, polarity, Sentiment, TextFeatures};

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// A message node's creation time does not parse. Fails the whole run.
    #[error("message {message_id}: unparseable creation time {value:?}: {source}")]
    Timestamp {
        message_id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("unknown output format {0:?} (expected jsonl, json or cbor)")]
    UnknownFormat(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CBOR encoding failed for {path}: {source}")]
    CborEncode {
        path: PathBuf,
        #[source]
        source: ciborium::ser::Error<std::io::Error>,
    },

    #[error("CBOR decoding failed for {path}: {source}")]
    CborDecode {
        path: PathBuf,
        #[source]
        source: ciborium::de::Error<std::io::Error>,
    },
}

impl FeatureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = FeatureError> = std::result::Result<T, E>;

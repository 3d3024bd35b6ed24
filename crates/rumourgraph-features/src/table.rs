//! Feature table and its on-disk formats
//!
//! One row per message node, columns in [`FEATURE_COLUMNS`] order. Rows are
//! never modified after extraction; the table is only flattened and written.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::text::Sentiment;
use crate::{FeatureError, Result};

/// Column order of the feature table.
pub const FEATURE_COLUMNS: [&str; 16] = [
    "id",
    "hour",
    "propagation",
    "has_mentions",
    "mention_count",
    "is_reply",
    "retweets",
    "favourites",
    "text",
    "tokens",
    "has_link",
    "has_hashtag",
    "hashtags",
    "sentiment",
    "author",
    "is_rumour",
];

/// Features of one message. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: String,
    pub hour: u32,
    /// Number of messages replying into this one, directly or transitively.
    pub propagation: u64,
    pub has_mentions: bool,
    pub mention_count: usize,
    pub is_reply: bool,
    /// Engagement attributed to this message by its direct replies.
    pub retweets: u64,
    pub favourites: u64,
    pub text: String,
    pub tokens: Vec<String>,
    pub has_link: bool,
    pub has_hashtag: bool,
    pub hashtags: Vec<String>,
    pub sentiment: Sentiment,
    /// Handle of the posting author; `None` when the graph has no `posted` edge.
    pub author: Option<String>,
    pub is_rumour: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Jsonl,
    /// A single JSON array.
    Json,
    Cbor,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Json => "json",
            OutputFormat::Cbor => "cbor",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            "json" => Ok(OutputFormat::Json),
            "cbor" => Ok(OutputFormat::Cbor),
            other => Err(FeatureError::UnknownFormat(other.to_string())),
        }
    }
}

/// The flat feature table of one run, sorted by message id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FeatureRow> {
        self.rows
            .binary_search_by(|row| row.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn rumour_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_rumour).count()
    }

    /// Serialize the whole table, then move it into place at `path`.
    pub fn write(&self, path: &Path, format: OutputFormat) -> Result<()> {
        write_atomically(path, |out| match format {
            OutputFormat::Jsonl => {
                for row in &self.rows {
                    serde_json::to_writer(&mut *out, row).map_err(|e| FeatureError::json(path, e))?;
                    out.write_all(b"\n").map_err(|e| FeatureError::io(path, e))?;
                }
                Ok(())
            }
            OutputFormat::Json => serde_json::to_writer_pretty(&mut *out, &self.rows)
                .map_err(|e| FeatureError::json(path, e)),
            OutputFormat::Cbor => ciborium::ser::into_writer(&self.rows, &mut *out).map_err(|e| {
                FeatureError::CborEncode {
                    path: path.to_path_buf(),
                    source: e,
                }
            }),
        })?;
        tracing::info!(path = %path.display(), rows = self.len(), %format, "wrote feature table");
        Ok(())
    }

    pub fn read(path: &Path, format: OutputFormat) -> Result<Self> {
        let file = File::open(path).map_err(|e| FeatureError::io(path, e))?;
        let reader = BufReader::new(file);
        let rows: Vec<FeatureRow> = match format {
            OutputFormat::Jsonl => {
                let mut rows = Vec::new();
                for line in reader.lines() {
                    let line = line.map_err(|e| FeatureError::io(path, e))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    rows.push(serde_json::from_str(&line).map_err(|e| FeatureError::json(path, e))?);
                }
                rows
            }
            OutputFormat::Json => {
                serde_json::from_reader(reader).map_err(|e| FeatureError::json(path, e))?
            }
            OutputFormat::Cbor => {
                ciborium::de::from_reader(reader).map_err(|e| FeatureError::CborDecode {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
        };
        Ok(Self::new(rows))
    }
}

/// `<path>.tmp`, next to `path`.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write through a `.tmp` sibling; `path` only appears once `body` succeeded.
pub(crate) fn write_atomically(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FeatureError::io(parent, e))?;
    }
    let tmp = tmp_sibling(path);
    let file = File::create(&tmp).map_err(|e| FeatureError::io(&tmp, e))?;
    let mut out = BufWriter::new(file);

    let written = body(&mut out).and_then(|()| out.flush().map_err(|e| FeatureError::io(&tmp, e)));
    if let Err(err) = written {
        drop(out);
        if let Err(cleanup) = fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial output");
        }
        return Err(err);
    }
    drop(out);
    fs::rename(&tmp, path).map_err(|e| FeatureError::io(path, e))
}

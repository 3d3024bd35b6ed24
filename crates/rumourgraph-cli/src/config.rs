//! Pipeline configuration
//!
//! Defaults, overridden by an optional JSON file (`--config`), overridden by
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rumourgraph_features::OutputFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root of the raw thread dataset.
    pub dataset: Option<PathBuf>,
    /// Directory receiving every stage's output.
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Keep thread tables and tree documents from a full run.
    pub keep_intermediates: bool,
    /// Also write the author report from a full run.
    pub author_report: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            output_dir: PathBuf::from("rumourgraph-out"),
            format: OutputFormat::Jsonl,
            keep_intermediates: true,
            author_report: true,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.output_dir.join("tables")
    }

    pub fn trees_dir(&self) -> PathBuf {
        self.output_dir.join("trees")
    }

    pub fn graph_path(&self) -> PathBuf {
        self.output_dir.join("graph.rgph")
    }

    pub fn features_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("features.{}", self.format.extension()))
    }

    pub fn authors_path(&self) -> PathBuf {
        self.output_dir.join("authors.json")
    }
}

//! Binary graph snapshot
//!
//! Layout: `b"RGPH"` magic, little-endian `u32` version, `u64` payload
//! length, then a bincode payload of `(nodes, edges)`. Indexes are not
//! stored; [`RumourGraph::from_parts`] checks the parts and rebuilds them
//! on load.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Edge, Node, RumourGraph};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"RGPH";
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("not a graph snapshot (bad magic)")]
    BadMagic,

    #[error("unsupported snapshot version {0} (expected {})", SNAPSHOT_VERSION)]
    UnsupportedVersion(u32),

    #[error("snapshot truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("snapshot payload: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("snapshot lists {key} more than once")]
    DuplicateNode { key: String },

    #[error("snapshot edge {edge} points at node {node}, but only {nodes} nodes exist")]
    DanglingEdge { edge: usize, node: u32, nodes: usize },

    #[error("snapshot lists edge {edge} more than once")]
    DuplicateEdge { edge: usize },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl RumourGraph {
    /// Serialize to the snapshot format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let (nodes, edges) = self.parts();
        let payload = bincode::serialize(&(nodes, edges))?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(word);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..HEADER_LEN]);
        let expected = u64::from_le_bytes(len) as usize;
        let payload = &bytes[HEADER_LEN..];
        if payload.len() < expected {
            return Err(SnapshotError::Truncated {
                expected,
                found: payload.len(),
            });
        }

        let (nodes, edges): (Vec<Node>, Vec<Edge>) = bincode::deserialize(&payload[..expected])?;
        Self::from_parts(nodes, edges)
    }

    /// Write the snapshot to `path` via a `.tmp` sibling and a rename.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = path.with_extension("rgph.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            nodes = self.node_count(),
            edges = self.edge_count(),
            "saved graph snapshot"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
        let graph = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded graph snapshot"
        );
        Ok(graph)
    }
}

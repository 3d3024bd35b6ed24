//! Pipeline stages
//!
//! Each stage reads the previous stage's output (from memory or disk) and
//! optionally persists its own, so stages can run in one process or as
//! separate invocations.

use std::path::Path;

use anyhow::{Context, Result};
use rumourgraph_graph::{
    assemble, read_tree_document, write_tree_document, GraphBuilder, ReplyTree, RumourGraph,
    TreeError,
};
use rumourgraph_ingest::{build_tables, write_table, ThreadTable};
use walkdir::WalkDir;

/// Raw dataset → one table per thread.
pub fn prepare(dataset: &Path, tables_dir: Option<&Path>) -> Result<Vec<ThreadTable>> {
    let tables = build_tables(dataset)
        .with_context(|| format!("building thread tables from {}", dataset.display()))?;
    if let Some(dir) = tables_dir {
        for table in &tables {
            write_table(dir, table)?;
        }
    }
    Ok(tables)
}

/// Tables → reply trees. A thread whose root record is missing is skipped;
/// duplicate ids or reply cycles fail the run.
pub fn structure(tables: &[ThreadTable], trees_dir: Option<&Path>) -> Result<Vec<ReplyTree>> {
    let mut trees = Vec::with_capacity(tables.len());
    let mut dropped = 0usize;

    for table in tables {
        let assembly = match assemble(table, &table.thread_id) {
            Ok(assembly) => assembly,
            Err(err @ TreeError::MissingRoot { .. }) => {
                tracing::warn!(error = %err, "skipping thread");
                continue;
            }
            Err(err) => return Err(err).context("assembling reply trees"),
        };
        if !assembly.dropped.is_empty() {
            tracing::warn!(
                thread_id = %table.thread_id,
                dropped = assembly.dropped.len(),
                "thread has messages unreachable from its root"
            );
            dropped += assembly.dropped.len();
        }
        if let Some(dir) = trees_dir {
            let path = dir.join(format!("{}.json", assembly.tree.root_id));
            write_tree_document(&path, &[&assembly.tree])?;
        }
        trees.push(assembly.tree);
    }

    tracing::info!(trees = trees.len(), dropped, "assembled reply trees");
    Ok(trees)
}

/// Every tree document in `dir`, in file-name order.
pub fn read_trees(dir: &Path) -> Result<Vec<ReplyTree>> {
    let mut trees = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if is_document(entry.path()) {
            trees.extend(read_tree_document(entry.path())?);
        }
    }
    Ok(trees)
}

fn is_document(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.'))
        .unwrap_or(false);
    visible && path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json")
}

pub fn build_graph(trees: &[ReplyTree]) -> RumourGraph {
    let mut builder = GraphBuilder::new();
    builder.ingest_all(trees);
    builder.into_graph()
}

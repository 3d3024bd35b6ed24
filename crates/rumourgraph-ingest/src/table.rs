//! Dataset walk and per-thread tables
//!
//! Expected layout (PHEME):
//!
//! ```text
//! <root>/<event>-all-rnr-threads/
//!     rumours/<thread_id>/source-tweets/<id>.json
//!     rumours/<thread_id>/reactions/<id>.json
//!     non-rumours/<thread_id>/...
//! ```
//!
//! The label directory decides `is_rumour`; the thread directory's name is
//! the id of the thread's root message.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::{DirEntry, WalkDir};

use crate::record::{normalize_record, MessageRecord};
use crate::{IngestError, Result};

/// Label directory name marking rumour threads.
pub const RUMOUR_LABEL: &str = "rumours";

const SOURCE_TWEETS_DIR: &str = "source-tweets";

/// A thread directory found in the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadDir {
    pub path: PathBuf,
    pub thread_id: String,
    /// Name of the parent directory (`rumours` / `non-rumours`).
    pub label: String,
}

impl ThreadDir {
    pub fn is_rumour(&self) -> bool {
        self.label == RUMOUR_LABEL
    }
}

/// Flat table of one thread's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTable {
    /// Id of the designated root message.
    pub thread_id: String,
    pub is_rumour: bool,
    pub rows: Vec<MessageRecord>,
}

impl ThreadTable {
    pub fn new(thread_id: impl Into<String>, is_rumour: bool, mut rows: Vec<MessageRecord>) -> Self {
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            thread_id: thread_id.into(),
            is_rumour,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// OS metadata entries (`.DS_Store`, `._foo.json`, ...). Skipped, never deleted.
fn is_stray(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn is_json_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().and_then(|e| e.to_str()) == Some("json")
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true)
}

fn looks_like_thread_dir(path: &Path) -> Result<bool> {
    if path.join(SOURCE_TWEETS_DIR).is_dir() {
        return Ok(true);
    }
    let entries = fs::read_dir(path).map_err(|e| IngestError::io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::io(path, e))?;
        if is_json_file(&entry.path()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Find every thread directory below `root`, in file-name order.
pub fn discover_threads(root: &Path) -> Result<Vec<ThreadDir>> {
    let mut threads = Vec::new();
    let mut walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_stray(e));

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        if !looks_like_thread_dir(path)? {
            continue;
        }

        let thread_id = entry.file_name().to_string_lossy().into_owned();
        let label = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(thread_id = %thread_id, label = %label, "found thread directory");
        threads.push(ThreadDir {
            path: path.to_path_buf(),
            thread_id,
            label,
        });
        walker.skip_current_dir();
    }

    Ok(threads)
}

/// Read every record of one thread into a flat table.
///
/// Malformed records are logged and skipped. A thread where every record
/// fails yields [`IngestError::EmptyThread`].
pub fn build_thread_table(dir: &ThreadDir) -> Result<ThreadTable> {
    let is_rumour = dir.is_rumour();
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(&dir.path)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_stray(e))
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_json_file(path) {
            continue;
        }

        match read_record(path, is_rumour) {
            Ok(row) => rows.push(row),
            Err(err) => {
                skipped += 1;
                tracing::warn!(thread_id = %dir.thread_id, error = %err, "skipping record");
            }
        }
    }

    if rows.is_empty() {
        return Err(IngestError::EmptyThread {
            thread_id: dir.thread_id.clone(),
        });
    }

    tracing::debug!(
        thread_id = %dir.thread_id,
        rows = rows.len(),
        skipped,
        "built thread table"
    );
    Ok(ThreadTable::new(dir.thread_id.clone(), is_rumour, rows))
}

fn read_record(path: &Path, is_rumour: bool) -> Result<MessageRecord> {
    let locator = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    let raw: Value = serde_json::from_str(&text)
        .map_err(|e| IngestError::malformed(&locator, format!("invalid JSON: {e}")))?;
    normalize_record(&raw, is_rumour, &locator)
}

/// Build tables for every thread below `root`.
///
/// Threads without a single usable record are logged and left out; any other
/// error aborts the walk.
pub fn build_tables(root: &Path) -> Result<Vec<ThreadTable>> {
    let threads = discover_threads(root)?;
    let mut tables = Vec::with_capacity(threads.len());
    for dir in &threads {
        match build_thread_table(dir) {
            Ok(table) => tables.push(table),
            Err(err @ IngestError::EmptyThread { .. }) => {
                tracing::warn!(error = %err, "dropping thread");
            }
            Err(err) => return Err(err),
        }
    }
    tracing::info!(
        threads = tables.len(),
        discovered = threads.len(),
        rows = tables.iter().map(ThreadTable::len).sum::<usize>(),
        "built thread tables"
    );
    Ok(tables)
}

/// Persist a table as `<out_dir>/<thread_id>.json`.
pub fn write_table(out_dir: &Path, table: &ThreadTable) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).map_err(|e| IngestError::io(out_dir, e))?;
    let path = out_dir.join(format!("{}.json", table.thread_id));
    let json = serde_json::to_string_pretty(table).map_err(|e| IngestError::Json {
        path: path.clone(),
        source: e,
    })?;
    fs::write(&path, json).map_err(|e| IngestError::io(&path, e))?;
    Ok(path)
}

pub fn read_table(path: &Path) -> Result<ThreadTable> {
    let text = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| IngestError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read every `*.json` table in `dir`, in file-name order.
pub fn read_tables(dir: &Path) -> Result<Vec<ThreadTable>> {
    let mut tables = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_stray(e))
    {
        let entry = entry?;
        if is_json_file(entry.path()) {
            tables.push(read_table(entry.path())?);
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn tweet(id: &str, reply_to: Option<&str>, user: &str) -> Value {
        json!({
            "id_str": id,
            "in_reply_to_status_id_str": reply_to,
            "text": format!("message {id}"),
            "created_at": "Wed Jan 07 11:06:08 +0000 2015",
            "retweet_count": 1,
            "favorite_count": 2,
            "user": {"id_str": format!("u-{user}"), "name": user, "screen_name": user},
            "entities": {"user_mentions": []}
        })
    }

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn sample_dataset(root: &Path) {
        let event = root.join("ottawashooting-all-rnr-threads");
        let t1 = event.join("rumours").join("100");
        write_json(&t1.join("source-tweets/100.json"), &tweet("100", None, "alice"));
        write_json(&t1.join("reactions/101.json"), &tweet("101", Some("100"), "bob"));
        write_json(&t1.join("annotation.json"), &json!({"is_rumour": "rumour"}));
        fs::write(t1.join("reactions/._101.json"), b"\x00\x05junk").unwrap();

        let t2 = event.join("non-rumours").join("200");
        write_json(&t2.join("source-tweets/200.json"), &tweet("200", None, "carol"));
        fs::write(t2.join("reactions.txt"), "not a record").unwrap();
        fs::write(event.join(".DS_Store"), b"junk").unwrap();
    }

    #[test]
    fn test_discover_threads_labels_and_ids() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());

        let threads = discover_threads(dir.path()).unwrap();
        let ids: Vec<_> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["200", "100"]);
        assert!(!threads[0].is_rumour());
        assert!(threads[1].is_rumour());
    }

    #[test]
    fn test_build_tables_skips_stray_and_thread_level_files() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());

        let tables = build_tables(dir.path()).unwrap();
        assert_eq!(tables.len(), 2);
        let rumour = tables.iter().find(|t| t.thread_id == "100").unwrap();
        assert!(rumour.is_rumour);
        assert_eq!(rumour.len(), 2);
        assert!(rumour.rows.iter().all(|r| r.is_rumour));
        assert_eq!(rumour.rows[1].in_reply_to_id.as_deref(), Some("100"));
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let dir = tempdir().unwrap();
        let t = dir.path().join("rumours").join("1");
        write_json(&t.join("source-tweets/1.json"), &tweet("1", None, "alice"));
        write_json(&t.join("reactions/2.json"), &json!({"id_str": "2"}));

        let table = build_thread_table(&discover_threads(dir.path()).unwrap()[0]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].id, "1");
    }

    #[test]
    fn test_thread_with_no_usable_records_is_dropped() {
        let dir = tempdir().unwrap();
        let t = dir.path().join("rumours").join("9");
        write_json(&t.join("source-tweets/9.json"), &json!({"text": "no id"}));

        let threads = discover_threads(dir.path()).unwrap();
        assert!(matches!(
            build_thread_table(&threads[0]),
            Err(IngestError::EmptyThread { .. })
        ));
        assert!(build_tables(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_table_persistence() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());
        let tables = build_tables(dir.path()).unwrap();

        let out = dir.path().join("tables");
        for table in &tables {
            write_table(&out, table).unwrap();
        }
        let restored = read_tables(&out).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].thread_id, "100");
        assert_eq!(&restored[0], tables.iter().find(|t| t.thread_id == "100").unwrap());
    }
}

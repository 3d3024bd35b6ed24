//! Reply-tree assembly
//!
//! Nests every message of a thread table under the message its
//! `in_reply_to_id` names, starting from the thread's designated root.
//!
//! Children are found through a parent → children index built in one pass
//! over the table, so assembly is linear in the number of rows.
//!
//! Dangling replies are dropped: a row whose parent id is not in the table
//! (and everything below it) never becomes reachable from the root. The ids
//! of dropped rows are reported in [`Assembly::dropped`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rumourgraph_ingest::{AuthorRef, MessageRecord, ThreadTable};
use serde::{Deserialize, Serialize};

/// Errors that invalidate a whole thread.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("thread {thread_id}: message id {id} appears more than once")]
    DuplicateId { thread_id: String, id: String },

    #[error("thread {thread_id}: root message {root_id} is not in the table")]
    MissingRoot { thread_id: String, root_id: String },

    #[error("thread {thread_id}: reply chain revisits message {id}")]
    CycleDetected { thread_id: String, id: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tree document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One message and the replies nested below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyNode {
    pub author: AuthorRef,
    pub rumour: bool,
    pub text: String,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub created_at: String,
    #[serde(default)]
    pub mentions: Vec<AuthorRef>,
    /// Child message id → child subtree.
    #[serde(default)]
    pub replies: BTreeMap<String, ReplyNode>,
}

impl ReplyNode {
    fn leaf(row: &MessageRecord) -> Self {
        Self {
            author: row.author.clone(),
            rumour: row.is_rumour,
            text: row.text.clone(),
            retweet_count: row.retweet_count,
            favorite_count: row.favorite_count,
            created_at: row.created_at.clone(),
            mentions: row.mentions.clone(),
            replies: BTreeMap::new(),
        }
    }

    /// Nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.replies.values().map(ReplyNode::node_count).sum::<usize>()
    }

    /// Messages on the longest chain starting at this node.
    pub fn depth(&self) -> usize {
        1 + self.replies.values().map(ReplyNode::depth).max().unwrap_or(0)
    }
}

/// A thread's reply tree, rooted at its designated root message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTree {
    pub root_id: String,
    pub root: ReplyNode,
}

impl ReplyTree {
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Every message id in the tree, root first, depth-first.
    pub fn message_ids(&self) -> Vec<&str> {
        fn walk<'a>(id: &'a str, node: &'a ReplyNode, out: &mut Vec<&'a str>) {
            out.push(id);
            for (child_id, child) in &node.replies {
                walk(child_id, child, out);
            }
        }
        let mut out = Vec::with_capacity(self.node_count());
        walk(&self.root_id, &self.root, &mut out);
        out
    }
}

/// Result of assembling one thread.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub tree: ReplyTree,
    /// Ids of rows that are not reachable from the root, sorted.
    pub dropped: Vec<String>,
}

/// Build the reply tree of `table` rooted at `root_id`.
pub fn assemble(table: &ThreadTable, root_id: &str) -> Result<Assembly, TreeError> {
    let thread_id = table.thread_id.as_str();

    let mut by_id: HashMap<&str, &MessageRecord> = HashMap::with_capacity(table.len());
    for row in &table.rows {
        if by_id.insert(row.id.as_str(), row).is_some() {
            return Err(TreeError::DuplicateId {
                thread_id: thread_id.to_string(),
                id: row.id.clone(),
            });
        }
    }

    let root = by_id
        .get(root_id)
        .copied()
        .ok_or_else(|| TreeError::MissingRoot {
            thread_id: thread_id.to_string(),
            root_id: root_id.to_string(),
        })?;

    let mut children: HashMap<&str, Vec<&MessageRecord>> = HashMap::new();
    for row in &table.rows {
        if let Some(parent) = row.in_reply_to_id.as_deref() {
            children.entry(parent).or_default().push(row);
        }
    }

    let mut placed: HashSet<&str> = HashSet::with_capacity(table.len());
    let root_node = nest(thread_id, root, &children, &mut placed)?;

    let mut dropped: Vec<String> = Vec::new();
    for row in &table.rows {
        if placed.contains(row.id.as_str()) {
            continue;
        }
        match row.in_reply_to_id.as_deref() {
            Some(parent) if !by_id.contains_key(parent) => {
                tracing::warn!(
                    thread_id,
                    id = %row.id,
                    in_reply_to = parent,
                    "dropping dangling reply"
                );
            }
            _ => tracing::debug!(thread_id, id = %row.id, "dropping unreachable message"),
        }
        dropped.push(row.id.clone());
    }
    dropped.sort();

    Ok(Assembly {
        tree: ReplyTree {
            root_id: root_id.to_string(),
            root: root_node,
        },
        dropped,
    })
}

fn nest<'a>(
    thread_id: &str,
    row: &'a MessageRecord,
    children: &HashMap<&str, Vec<&'a MessageRecord>>,
    placed: &mut HashSet<&'a str>,
) -> Result<ReplyNode, TreeError> {
    if !placed.insert(row.id.as_str()) {
        return Err(TreeError::CycleDetected {
            thread_id: thread_id.to_string(),
            id: row.id.clone(),
        });
    }

    let mut node = ReplyNode::leaf(row);
    if let Some(replies) = children.get(row.id.as_str()) {
        for reply in replies {
            let child = nest(thread_id, reply, children, placed)?;
            node.replies.insert(reply.id.clone(), child);
        }
    }
    Ok(node)
}

// ============================================================================
// Tree documents
// ============================================================================

/// Write trees as one JSON document `{ "<root_id>": { ..., "replies": {..} } }`.
pub fn write_tree_document(path: &Path, trees: &[&ReplyTree]) -> Result<(), TreeError> {
    let doc: BTreeMap<&str, &ReplyNode> = trees
        .iter()
        .map(|t| (t.root_id.as_str(), &t.root))
        .collect();
    let json = serde_json::to_string_pretty(&doc).map_err(|e| TreeError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TreeError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, json).map_err(|e| TreeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read every tree of a tree document.
pub fn read_tree_document(path: &Path) -> Result<Vec<ReplyTree>, TreeError> {
    let text = fs::read_to_string(path).map_err(|e| TreeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    // Two JSON levels per reply: long chains exceed serde_json's default limit.
    let mut de = serde_json::Deserializer::from_str(&text);
    de.disable_recursion_limit();
    let doc = BTreeMap::<String, ReplyNode>::deserialize(serde_stacker::Deserializer::new(&mut de))
        .and_then(|doc| de.end().map(|()| doc))
        .map_err(|e| TreeError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(doc
        .into_iter()
        .map(|(root_id, root)| ReplyTree { root_id, root })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, reply_to: Option<&str>, handle: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            is_rumour: true,
            text: format!("text {id}"),
            in_reply_to_id: reply_to.map(str::to_string),
            author: AuthorRef {
                id: format!("u-{handle}"),
                name: handle.to_uppercase(),
                screen_name: handle.to_string(),
            },
            retweet_count: 0,
            favorite_count: 0,
            created_at: "2015-01-07 11:06:08".to_string(),
            mentions: vec![],
        }
    }

    fn table(rows: Vec<MessageRecord>) -> ThreadTable {
        ThreadTable::new("root", true, rows)
    }

    #[test]
    fn test_nests_replies_under_parents() {
        let t = table(vec![
            row("root", None, "y"),
            row("a", Some("root"), "x"),
            row("b", Some("a"), "z"),
            row("c", Some("root"), "x"),
        ]);
        let assembly = assemble(&t, "root").unwrap();
        let tree = &assembly.tree;
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.depth(), 3);
        assert!(assembly.dropped.is_empty());
        assert_eq!(
            tree.root.replies.keys().collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert!(tree.root.replies["a"].replies.contains_key("b"));
    }

    #[test]
    fn test_single_message_thread() {
        let assembly = assemble(&table(vec![row("root", None, "y")]), "root").unwrap();
        assert_eq!(assembly.tree.node_count(), 1);
        assert_eq!(assembly.tree.depth(), 1);
    }

    #[test]
    fn test_dangling_replies_are_dropped() {
        let t = table(vec![
            row("root", None, "y"),
            row("a", Some("root"), "x"),
            row("orphan", Some("not-in-table"), "x"),
            row("orphan-child", Some("orphan"), "z"),
        ]);
        let assembly = assemble(&t, "root").unwrap();
        assert_eq!(assembly.tree.node_count(), 2);
        assert_eq!(assembly.dropped, vec!["orphan", "orphan-child"]);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let t = table(vec![row("root", None, "y"), row("root", None, "y")]);
        assert!(matches!(
            assemble(&t, "root"),
            Err(TreeError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let t = table(vec![row("a", None, "y")]);
        assert!(matches!(
            assemble(&t, "root"),
            Err(TreeError::MissingRoot { .. })
        ));
    }

    #[test]
    fn test_cycle_through_root_is_rejected() {
        let t = table(vec![
            row("root", Some("b"), "y"),
            row("a", Some("root"), "x"),
            row("b", Some("a"), "z"),
        ]);
        assert!(matches!(
            assemble(&t, "root"),
            Err(TreeError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_cycle_away_from_root_is_unreachable() {
        let t = table(vec![
            row("root", None, "y"),
            row("p", Some("q"), "x"),
            row("q", Some("p"), "z"),
        ]);
        let assembly = assemble(&t, "root").unwrap();
        assert_eq!(assembly.tree.node_count(), 1);
        assert_eq!(assembly.dropped, vec!["p", "q"]);
    }

    #[test]
    fn test_tree_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let t = table(vec![row("root", None, "y"), row("a", Some("root"), "x")]);
        let tree = assemble(&t, "root").unwrap().tree;

        let path = dir.path().join("trees").join("root.json");
        write_tree_document(&path, &[&tree]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"replies\""));

        let restored = read_tree_document(&path).unwrap();
        assert_eq!(restored, vec![tree]);
    }

    #[test]
    fn test_long_reply_chain_survives_tree_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = vec![row("root", None, "y")];
        let mut parent = "root".to_string();
        for i in 0..300 {
            let id = format!("m{i}");
            rows.push(row(&id, Some(&parent), "x"));
            parent = id;
        }
        let tree = assemble(&table(rows), "root").unwrap().tree;
        assert_eq!(tree.depth(), 301);

        let path = dir.path().join("root.json");
        write_tree_document(&path, &[&tree]).unwrap();
        let restored = read_tree_document(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].node_count(), 301);
        assert_eq!(restored, vec![tree]);
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{} {}").unwrap();
        assert!(matches!(
            read_tree_document(&path),
            Err(TreeError::Json { .. })
        ));
    }
}

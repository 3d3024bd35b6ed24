//! Rumourgraph: typed message/author graph
//!
//! Thread tables become reply trees (`reply_tree`), reply trees become one
//! directed graph per run (`builder`), and the graph can be persisted between
//! pipeline stages (`snapshot`).
//!
//! Storage layout:
//! 1. **Nodes**: a dense `Vec<Node>` addressed by [`NodeId`]; messages are
//!    keyed by message id, authors by handle (`screen_name`)
//! 2. **Kind bitmaps**: one Roaring bitmap per node kind for fast iteration
//! 3. **Edges**: an edge list with forward/backward indexes keyed by
//!    `(node, EdgeKind)`
//! 4. **Edge identity**: at most one edge per `(source, target, kind)`;
//!    re-adding updates the edge's weights in place
//!
//! Only nodes and edges are persisted; every index is rebuilt on load.

pub mod builder;
pub mod reply_tree;
pub mod snapshot;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

pub use builder::{add_message, GraphBuilder};
pub use reply_tree::{
    assemble, read_tree_document, write_tree_document, Assembly, ReplyNode, ReplyTree, TreeError,
};
pub use snapshot::{SnapshotError, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

// ============================================================================
// Nodes
// ============================================================================

/// Dense node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageNode {
    pub id: String,
    pub text: String,
    /// Normalized creation time (`%Y-%m-%d %H:%M:%S`).
    pub created_at: String,
    pub is_rumour: bool,
}

/// An author, identified by handle across the whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorNode {
    pub handle: String,
    pub name: String,
    pub author_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Message(MessageNode),
    Author(AuthorNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Message(_) => NodeKind::Message,
            Node::Author(_) => NodeKind::Author,
        }
    }

    fn key(&self) -> NodeKey {
        match self {
            Node::Message(m) => NodeKey::Message(m.id.clone()),
            Node::Author(a) => NodeKey::Author(a.handle.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Message,
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Message(String),
    Author(String),
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::Message(id) => write!(f, "message {id}"),
            NodeKey::Author(handle) => write!(f, "author @{handle}"),
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    /// author → message
    Posted,
    /// message → mentioned author
    Mention,
    /// reply → the message it answers
    Replies,
}

/// Edge payload. Only `Replies` carries weights: the engagement the reply
/// received, attributed to the message being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Posted,
    Mention,
    Replies { retweet: u64, favourite: u64 },
}

impl Relation {
    pub fn kind(&self) -> EdgeKind {
        match self {
            Relation::Posted => EdgeKind::Posted,
            Relation::Mention => EdgeKind::Mention,
            Relation::Replies { .. } => EdgeKind::Replies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: Relation,
}

impl Edge {
    pub fn kind(&self) -> EdgeKind {
        self.relation.kind()
    }
}

/// Node/edge counts of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub messages: usize,
    pub authors: usize,
    pub posted: usize,
    pub mentions: usize,
    pub replies: usize,
}

// ============================================================================
// RumourGraph
// ============================================================================

/// Directed graph of messages and authors.
#[derive(Debug, Default)]
pub struct RumourGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_index: AHashMap<NodeKey, NodeId>,
    messages: RoaringBitmap,
    authors: RoaringBitmap,
    edge_index: AHashMap<(NodeId, NodeId, EdgeKind), u32>,
    forward_index: AHashMap<(NodeId, EdgeKind), Vec<u32>>,
    backward_index: AHashMap<(NodeId, EdgeKind), Vec<u32>>,
}

impl RumourGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph (and all of its indexes) from raw parts.
    ///
    /// Parts must be exactly what a graph holds: unique node keys, unique
    /// `(source, target, kind)` edges, and every endpoint an existing node.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, SnapshotError> {
        let mut graph = Self::new();
        for (position, node) in nodes.into_iter().enumerate() {
            let key = node.key();
            if graph.insert_node(node).index() != position {
                return Err(SnapshotError::DuplicateNode {
                    key: key.to_string(),
                });
            }
        }

        let node_count = graph.nodes.len();
        for (position, edge) in edges.into_iter().enumerate() {
            if let Some(missing) = [edge.source, edge.target]
                .into_iter()
                .find(|id| id.index() >= node_count)
            {
                return Err(SnapshotError::DanglingEdge {
                    edge: position,
                    node: missing.raw(),
                    nodes: node_count,
                });
            }
            if !graph.upsert_edge(edge.source, edge.target, edge.relation) {
                return Err(SnapshotError::DuplicateEdge { edge: position });
            }
        }
        Ok(graph)
    }

    pub(crate) fn parts(&self) -> (&[Node], &[Edge]) {
        (&self.nodes, &self.edges)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len() as usize
    }

    pub fn author_count(&self) -> usize {
        self.authors.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            messages: self.message_count(),
            authors: self.author_count(),
            ..GraphStats::default()
        };
        for edge in &self.edges {
            match edge.kind() {
                EdgeKind::Posted => stats.posted += 1,
                EdgeKind::Mention => stats.mentions += 1,
                EdgeKind::Replies => stats.replies += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn message(&self, id: NodeId) -> Option<&MessageNode> {
        match self.node(id)? {
            Node::Message(m) => Some(m),
            Node::Author(_) => None,
        }
    }

    pub fn author(&self, id: NodeId) -> Option<&AuthorNode> {
        match self.node(id)? {
            Node::Author(a) => Some(a),
            Node::Message(_) => None,
        }
    }

    /// Look up a message node by message id.
    pub fn message_node(&self, message_id: &str) -> Option<NodeId> {
        self.node_index
            .get(&NodeKey::Message(message_id.to_string()))
            .copied()
    }

    /// Look up an author node by handle.
    pub fn author_node(&self, handle: &str) -> Option<NodeId> {
        self.node_index
            .get(&NodeKey::Author(handle.to_string()))
            .copied()
    }

    pub fn is_message(&self, id: NodeId) -> bool {
        self.messages.contains(id.raw())
    }

    /// Message nodes in ascending id order.
    pub fn message_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.messages.iter().map(NodeId)
    }

    /// Author nodes in ascending id order.
    pub fn author_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.authors.iter().map(NodeId)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Add a message node unless one with the same message id exists.
    ///
    /// Returns the node and whether it was created.
    pub fn ensure_message(&mut self, message: MessageNode) -> (NodeId, bool) {
        if let Some(id) = self.message_node(&message.id) {
            return (id, false);
        }
        (self.insert_node(Node::Message(message)), true)
    }

    /// Add an author node unless one with the same handle exists. The first
    /// seen name and author id are kept.
    pub fn ensure_author(&mut self, author: AuthorNode) -> (NodeId, bool) {
        if let Some(id) = self.author_node(&author.handle) {
            return (id, false);
        }
        (self.insert_node(Node::Author(author)), true)
    }

    fn insert_node(&mut self, node: Node) -> NodeId {
        let key = node.key();
        if let Some(&id) = self.node_index.get(&key) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        match node.kind() {
            NodeKind::Message => self.messages.insert(id.raw()),
            NodeKind::Author => self.authors.insert(id.raw()),
        };
        self.node_index.insert(key, id);
        self.nodes.push(node);
        id
    }

    /// Add `source -[relation]-> target`, or overwrite the payload of the
    /// existing edge with the same endpoints and kind.
    ///
    /// Returns whether a new edge was created.
    pub fn upsert_edge(&mut self, source: NodeId, target: NodeId, relation: Relation) -> bool {
        let kind = relation.kind();
        if let Some(&edge_id) = self.edge_index.get(&(source, target, kind)) {
            self.edges[edge_id as usize].relation = relation;
            return false;
        }

        let edge_id = self.edges.len() as u32;
        self.edge_index.insert((source, target, kind), edge_id);
        self.forward_index
            .entry((source, kind))
            .or_insert_with(Vec::new)
            .push(edge_id);
        self.backward_index
            .entry((target, kind))
            .or_insert_with(Vec::new)
            .push(edge_id);
        self.edges.push(Edge {
            source,
            target,
            relation,
        });
        true
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter()
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        self.edge_index.contains_key(&(source, target, kind))
    }

    pub fn edge(&self, source: NodeId, target: NodeId, kind: EdgeKind) -> Option<&Edge> {
        let id = self.edge_index.get(&(source, target, kind))?;
        self.edges.get(*id as usize)
    }

    /// Outgoing edges of `kind`, in insertion order.
    pub fn outgoing(&self, source: NodeId, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.indexed(&self.forward_index, (source, kind))
    }

    /// Incoming edges of `kind`, in insertion order.
    pub fn incoming(&self, target: NodeId, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.indexed(&self.backward_index, (target, kind))
    }

    pub fn out_degree(&self, source: NodeId, kind: EdgeKind) -> usize {
        self.forward_index
            .get(&(source, kind))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn in_degree(&self, target: NodeId, kind: EdgeKind) -> usize {
        self.backward_index
            .get(&(target, kind))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Targets of every outgoing edge, any kind.
    pub fn successors(&self, source: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        [EdgeKind::Posted, EdgeKind::Mention, EdgeKind::Replies]
            .into_iter()
            .flat_map(move |kind| self.outgoing(source, kind).map(|e| e.target))
    }

    fn indexed<'a>(
        &'a self,
        index: &'a AHashMap<(NodeId, EdgeKind), Vec<u32>>,
        key: (NodeId, EdgeKind),
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        index
            .get(&key)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&id| self.edges.get(id as usize))
    }
}

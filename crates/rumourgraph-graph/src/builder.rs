//! Graph construction from reply trees
//!
//! Every message becomes a message node, every handle an author node.
//! Re-adding anything already present is a no-op, except that `replies`
//! edge weights are overwritten by the latest ingestion.

use rumourgraph_ingest::AuthorRef;

use crate::{AuthorNode, GraphStats, MessageNode, NodeId, Relation, ReplyNode, ReplyTree, RumourGraph};

/// Add `node` (posted by its author, mentioning its mentions) and its whole
/// reply subtree to `graph`. Returns the message's node.
///
/// Children are added before their `replies` edge so both endpoints exist.
pub fn add_message(graph: &mut RumourGraph, msg_id: &str, node: &ReplyNode) -> NodeId {
    let (message, created) = graph.ensure_message(MessageNode {
        id: msg_id.to_string(),
        text: node.text.clone(),
        created_at: node.created_at.clone(),
        is_rumour: node.rumour,
    });
    if created {
        tracing::debug!(id = msg_id, "added message node");
    }

    let author = ensure_author(graph, &node.author);
    graph.upsert_edge(author, message, Relation::Posted);

    for mention in &node.mentions {
        let mentioned = ensure_author(graph, mention);
        graph.upsert_edge(message, mentioned, Relation::Mention);
    }

    for (child_id, child) in &node.replies {
        let reply = add_message(graph, child_id, child);
        graph.upsert_edge(
            reply,
            message,
            Relation::Replies {
                retweet: child.retweet_count,
                favourite: child.favorite_count,
            },
        );
    }

    message
}

fn ensure_author(graph: &mut RumourGraph, author: &AuthorRef) -> NodeId {
    let (id, created) = graph.ensure_author(AuthorNode {
        handle: author.screen_name.clone(),
        name: author.name.clone(),
        author_id: author.id.clone(),
    });
    if created {
        tracing::debug!(handle = %author.screen_name, "added author node");
    }
    id
}

/// Accumulates reply trees into one graph per run.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: RumourGraph,
    trees: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue building on top of an existing graph (e.g. a loaded snapshot).
    pub fn with_graph(graph: RumourGraph) -> Self {
        Self { graph, trees: 0 }
    }

    pub fn ingest_tree(&mut self, tree: &ReplyTree) -> NodeId {
        self.trees += 1;
        add_message(&mut self.graph, &tree.root_id, &tree.root)
    }

    pub fn ingest_all<'a>(&mut self, trees: impl IntoIterator<Item = &'a ReplyTree>) {
        for tree in trees {
            self.ingest_tree(tree);
        }
    }

    pub fn trees_ingested(&self) -> usize {
        self.trees
    }

    pub fn graph(&self) -> &RumourGraph {
        &self.graph
    }

    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn into_graph(self) -> RumourGraph {
        let stats = self.graph.stats();
        tracing::info!(
            trees = self.trees,
            messages = stats.messages,
            authors = stats.authors,
            posted = stats.posted,
            mentions = stats.mentions,
            replies = stats.replies,
            "built graph"
        );
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdgeKind;
    use std::collections::BTreeMap;

    fn who(handle: &str) -> AuthorRef {
        AuthorRef {
            id: format!("u-{handle}"),
            name: handle.to_uppercase(),
            screen_name: handle.to_string(),
        }
    }

    fn node(handle: &str, retweets: u64, replies: Vec<(&str, ReplyNode)>) -> ReplyNode {
        ReplyNode {
            author: who(handle),
            rumour: true,
            text: "text".to_string(),
            retweet_count: retweets,
            favorite_count: 1,
            created_at: "2015-01-07 11:06:08".to_string(),
            mentions: vec![],
            replies: replies
                .into_iter()
                .map(|(id, n)| (id.to_string(), n))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn sample_tree() -> ReplyTree {
        ReplyTree {
            root_id: "root".to_string(),
            root: node("y", 0, vec![("1", node("x", 2, vec![]))]),
        }
    }

    #[test]
    fn test_single_reply_thread() {
        let mut builder = GraphBuilder::new();
        builder.ingest_tree(&sample_tree());
        let g = builder.into_graph();

        let root = g.message_node("root").unwrap();
        let reply = g.message_node("1").unwrap();
        assert_eq!(g.message_count(), 2);
        assert_eq!(g.author_count(), 2);

        let edge = g.edge(reply, root, EdgeKind::Replies).unwrap();
        assert_eq!(edge.relation, Relation::Replies { retweet: 2, favourite: 1 });
        assert_eq!(g.out_degree(root, EdgeKind::Replies), 0);

        let stats = g.stats();
        assert_eq!((stats.posted, stats.replies, stats.mentions), (2, 1, 0));
    }

    #[test]
    fn test_mentions_share_author_nodes_by_handle() {
        let mut root = node("y", 0, vec![]);
        root.mentions = vec![who("x"), who("z")];
        let mut reply = node("x", 0, vec![]);
        reply.mentions = vec![who("y")];
        root.replies.insert("1".to_string(), reply);

        let mut g = RumourGraph::new();
        let root_id = add_message(&mut g, "root", &root);

        assert_eq!(g.author_count(), 3);
        assert_eq!(g.out_degree(root_id, EdgeKind::Mention), 2);
        let y = g.author_node("y").unwrap();
        assert_eq!(g.in_degree(y, EdgeKind::Mention), 1);
        assert_eq!(g.out_degree(y, EdgeKind::Posted), 1);
    }

    #[test]
    fn test_reingesting_is_idempotent_with_last_write_wins() {
        let mut builder = GraphBuilder::new();
        builder.ingest_tree(&sample_tree());
        let before = builder.stats();

        let mut updated = sample_tree();
        if let Some(child) = updated.root.replies.get_mut("1") {
            child.retweet_count = 7;
        }
        builder.ingest_tree(&updated);
        assert_eq!(builder.stats(), before);
        assert_eq!(builder.trees_ingested(), 2);

        let g = builder.graph();
        let edge = g
            .edge(g.message_node("1").unwrap(), g.message_node("root").unwrap(), EdgeKind::Replies)
            .unwrap();
        assert_eq!(edge.relation, Relation::Replies { retweet: 7, favourite: 1 });
    }

    #[test]
    fn test_same_handle_across_threads_is_one_author() {
        let mut builder = GraphBuilder::new();
        builder.ingest_tree(&sample_tree());
        builder.ingest_tree(&ReplyTree {
            root_id: "other".to_string(),
            root: node("x", 0, vec![]),
        });
        let g = builder.graph();
        assert_eq!(g.author_count(), 2);
        assert_eq!(g.out_degree(g.author_node("x").unwrap(), EdgeKind::Posted), 2);
    }
}

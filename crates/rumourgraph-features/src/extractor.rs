//! Per-message feature extraction
//!
//! An [`ExtractionRun`] reads one graph and owns every cache used while
//! doing so. Caches live exactly as long as the run; nothing is shared
//! between runs.
//!
//! Propagation is computed by a sequential, memoized walk over inverse
//! `replies` edges. Engagement totals do not depend on one another, so they
//! are computed in parallel alongside that walk and merged afterwards.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDateTime, Timelike};
use rayon::prelude::*;
use rumourgraph_graph::{EdgeKind, MessageNode, NodeId, Relation, RumourGraph};
use rumourgraph_ingest::NORMALIZED_TIME_FORMAT;

use crate::table::{FeatureRow, FeatureTable};
use crate::text::analyze_text;
use crate::{FeatureError, Result};

/// Retweets and favourites accrued to a message through its direct replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub retweets: u64,
    pub favourites: u64,
}

/// Extract the feature table of every message node in `graph`.
pub fn extract_all(graph: &RumourGraph) -> Result<FeatureTable> {
    ExtractionRun::new(graph).execute()
}

pub struct ExtractionRun<'g> {
    graph: &'g RumourGraph,
    propagation: HashMap<NodeId, u64>,
    authors: HashMap<NodeId, Option<String>>,
    mentions: HashMap<NodeId, Vec<String>>,
    engagement: HashMap<NodeId, Engagement>,
    cycle_guards: usize,
}

impl<'g> ExtractionRun<'g> {
    pub fn new(graph: &'g RumourGraph) -> Self {
        Self {
            graph,
            propagation: HashMap::new(),
            authors: HashMap::new(),
            mentions: HashMap::new(),
            engagement: HashMap::new(),
            cycle_guards: 0,
        }
    }

    /// Compute every row. Fails without producing a table if any message
    /// timestamp does not parse.
    pub fn execute(mut self) -> Result<FeatureTable> {
        let graph = self.graph;
        let messages: Vec<NodeId> = graph.message_ids().collect();

        let (engagement, ()) = rayon::join(
            || engagement_totals(graph, &messages),
            || {
                for &id in &messages {
                    self.propagation(id);
                }
            },
        );
        self.engagement = engagement;

        let mut rows = Vec::with_capacity(messages.len());
        for &id in &messages {
            if let Some(message) = graph.message(id) {
                rows.push(self.row(id, message)?);
            }
        }

        if self.cycle_guards > 0 {
            tracing::warn!(
                guards = self.cycle_guards,
                "reply cycles found; affected propagation counts are partial"
            );
        }
        tracing::info!(rows = rows.len(), "extracted features");
        Ok(FeatureTable::new(rows))
    }

    fn row(&mut self, id: NodeId, message: &MessageNode) -> Result<FeatureRow> {
        let hour = NaiveDateTime::parse_from_str(&message.created_at, NORMALIZED_TIME_FORMAT)
            .map_err(|e| FeatureError::Timestamp {
                message_id: message.id.clone(),
                value: message.created_at.clone(),
                source: e,
            })?
            .hour();

        let propagation = self.propagation(id);
        let author = self.author(id);
        let mention_count = self.mentions(id).len();
        let engagement = self.engagement(id);
        let text = analyze_text(&message.text);

        Ok(FeatureRow {
            id: message.id.clone(),
            hour,
            propagation,
            has_mentions: mention_count > 0,
            mention_count,
            is_reply: self.is_reply(id),
            retweets: engagement.retweets,
            favourites: engagement.favourites,
            text: message.text.clone(),
            has_hashtag: text.has_hashtag(),
            tokens: text.tokens,
            has_link: text.has_link,
            hashtags: text.hashtags,
            sentiment: text.sentiment,
            author,
            is_rumour: message.is_rumour,
        })
    }

    /// Messages that reply into `id`, directly or transitively.
    pub fn propagation(&mut self, id: NodeId) -> u64 {
        let mut visited = HashSet::new();
        self.propagation_from(id, &mut visited).0
    }

    /// Post-order walk over inverse `replies` edges with an explicit stack.
    /// Returns the count and whether it is complete (no cycle guard fired
    /// below `id`). Only complete counts are memoized.
    fn propagation_from(&mut self, id: NodeId, visited: &mut HashSet<NodeId>) -> (u64, bool) {
        let mut stack: Vec<PropagationFrame> = Vec::new();
        let mut settled = match self.enter(id, visited) {
            Visit::Settled(count, done) => return (count, done),
            Visit::Open(frame) => {
                stack.push(frame);
                None
            }
        };

        loop {
            let Some(top) = stack.last_mut() else {
                return settled.unwrap_or((0, true));
            };
            if let Some((count, done)) = settled.take() {
                top.total += 1 + count;
                top.complete &= done;
            }

            if let Some(&child) = top.replies.get(top.next) {
                top.next += 1;
                match self.enter(child, visited) {
                    Visit::Settled(count, done) => settled = Some((count, done)),
                    Visit::Open(frame) => stack.push(frame),
                }
                continue;
            }

            let Some(frame) = stack.pop() else { continue };
            if frame.complete {
                self.propagation.insert(frame.id, frame.total);
            }
            if stack.is_empty() {
                return (frame.total, frame.complete);
            }
            settled = Some((frame.total, frame.complete));
        }
    }

    fn enter(&mut self, id: NodeId, visited: &mut HashSet<NodeId>) -> Visit {
        if let Some(&count) = self.propagation.get(&id) {
            return Visit::Settled(count, true);
        }
        if !visited.insert(id) {
            self.cycle_guards += 1;
            tracing::warn!(node = id.raw(), "reply cycle revisits message; counting it as 0");
            return Visit::Settled(0, false);
        }
        let graph = self.graph;
        let replies = graph
            .incoming(id, EdgeKind::Replies)
            .map(|edge| edge.source)
            .filter(|&source| graph.is_message(source))
            .collect();
        Visit::Open(PropagationFrame {
            id,
            replies,
            next: 0,
            total: 0,
            complete: true,
        })
    }

    /// Handle of the message's author, from its incoming `posted` edge.
    pub fn author(&mut self, id: NodeId) -> Option<String> {
        if let Some(cached) = self.authors.get(&id) {
            return cached.clone();
        }
        let graph = self.graph;
        let mut posters = graph
            .incoming(id, EdgeKind::Posted)
            .filter_map(|e| graph.author(e.source));
        let handle = posters.next().map(|a| a.handle.clone());
        match &handle {
            None => tracing::warn!(node = id.raw(), "message has no posted edge; author left empty"),
            Some(first) if posters.next().is_some() => {
                tracing::warn!(node = id.raw(), author = %first, "message has several posted edges; using the first")
            }
            Some(_) => {}
        }
        self.authors.insert(id, handle.clone());
        handle
    }

    /// Handles mentioned by the message, in edge order.
    pub fn mentions(&mut self, id: NodeId) -> &[String] {
        let graph = self.graph;
        self.mentions.entry(id).or_insert_with(|| {
            graph
                .outgoing(id, EdgeKind::Mention)
                .filter_map(|e| graph.author(e.target))
                .map(|a| a.handle.clone())
                .collect()
        })
    }

    pub fn is_reply(&self, id: NodeId) -> bool {
        self.graph.out_degree(id, EdgeKind::Replies) > 0
    }

    pub fn engagement(&mut self, id: NodeId) -> Engagement {
        let graph = self.graph;
        *self
            .engagement
            .entry(id)
            .or_insert_with(|| engagement_of(graph, id))
    }
}

struct PropagationFrame {
    id: NodeId,
    replies: Vec<NodeId>,
    next: usize,
    total: u64,
    complete: bool,
}

enum Visit {
    Settled(u64, bool),
    Open(PropagationFrame),
}

fn engagement_of(graph: &RumourGraph, id: NodeId) -> Engagement {
    graph
        .incoming(id, EdgeKind::Replies)
        .fold(Engagement::default(), |acc, edge| match edge.relation {
            Relation::Replies { retweet, favourite } => Engagement {
                retweets: acc.retweets + retweet,
                favourites: acc.favourites + favourite,
            },
            _ => acc,
        })
}

fn engagement_totals(graph: &RumourGraph, messages: &[NodeId]) -> HashMap<NodeId, Engagement> {
    messages
        .par_iter()
        .map(|&id| (id, engagement_of(graph, id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumourgraph_graph::AuthorNode;

    fn message(g: &mut RumourGraph, id: &str) -> NodeId {
        g.ensure_message(MessageNode {
            id: id.to_string(),
            text: format!("message {id}"),
            created_at: "2015-01-07 11:06:08".to_string(),
            is_rumour: false,
        })
        .0
    }

    fn author(g: &mut RumourGraph, handle: &str) -> NodeId {
        g.ensure_author(AuthorNode {
            handle: handle.to_string(),
            name: handle.to_uppercase(),
            author_id: format!("u-{handle}"),
        })
        .0
    }

    fn reply(g: &mut RumourGraph, child: NodeId, parent: NodeId, retweet: u64) {
        g.upsert_edge(child, parent, Relation::Replies { retweet, favourite: 1 });
    }

    #[test]
    fn test_propagation_on_reply_chain() {
        let mut g = RumourGraph::new();
        let root = message(&mut g, "root");
        let a = message(&mut g, "a");
        let b = message(&mut g, "b");
        reply(&mut g, a, root, 0);
        reply(&mut g, b, a, 0);

        let mut run = ExtractionRun::new(&g);
        assert_eq!(run.propagation(b), 0);
        assert_eq!(run.propagation(a), 1);
        assert_eq!(run.propagation(root), 2);
    }

    #[test]
    fn test_propagation_counts_all_descendants() {
        let mut g = RumourGraph::new();
        let root = message(&mut g, "root");
        let ids: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| message(&mut g, id)).collect();
        reply(&mut g, ids[0], root, 0);
        reply(&mut g, ids[1], root, 0);
        reply(&mut g, ids[2], ids[0], 0);
        reply(&mut g, ids[3], ids[2], 0);

        let mut run = ExtractionRun::new(&g);
        assert_eq!(run.propagation(root), 4);
        assert_eq!(run.propagation(ids[0]), 2);
        assert_eq!(run.propagation(ids[1]), 0);
    }

    #[test]
    fn test_cycle_is_guarded_and_not_memoized() {
        let mut g = RumourGraph::new();
        let a = message(&mut g, "a");
        let b = message(&mut g, "b");
        reply(&mut g, a, b, 0);
        reply(&mut g, b, a, 0);

        let mut run = ExtractionRun::new(&g);
        // a <- b <- a(revisit, 0): 1 + (1 + 0)
        assert_eq!(run.propagation(a), 2);
        assert!(run.cycle_guards > 0);
        assert!(run.propagation.is_empty());
    }

    #[test]
    fn test_propagation_on_very_deep_chain() {
        let mut g = RumourGraph::new();
        let mut parent = message(&mut g, "root");
        for i in 0..20_000 {
            let child = message(&mut g, &format!("m{i}"));
            reply(&mut g, child, parent, 0);
            parent = child;
        }

        let table = extract_all(&g).unwrap();
        assert_eq!(table.get("root").unwrap().propagation, 20_000);
        assert_eq!(table.get("m0").unwrap().propagation, 19_999);
        assert_eq!(table.get("m19999").unwrap().propagation, 0);
    }

    #[test]
    fn test_engagement_sums_incoming_replies() {
        let mut g = RumourGraph::new();
        let root = message(&mut g, "root");
        let a = message(&mut g, "a");
        let b = message(&mut g, "b");
        reply(&mut g, a, root, 2);
        reply(&mut g, b, root, 3);

        let mut run = ExtractionRun::new(&g);
        assert_eq!(run.engagement(root), Engagement { retweets: 5, favourites: 2 });
        assert_eq!(run.engagement(a), Engagement::default());
        assert_eq!(engagement_totals(&g, &[root, a])[&root].retweets, 5);
    }

    #[test]
    fn test_missing_author_is_absent_not_fatal() {
        let mut g = RumourGraph::new();
        let m = message(&mut g, "m");
        let other = message(&mut g, "other");
        let y = author(&mut g, "y");
        let x = author(&mut g, "x");
        g.upsert_edge(y, other, Relation::Posted);
        g.upsert_edge(m, x, Relation::Mention);

        let table = extract_all(&g).unwrap();
        let row = table.get("m").unwrap();
        assert_eq!(row.author, None);
        assert!(row.has_mentions);
        assert_eq!(row.mention_count, 1);
        assert_eq!(table.get("other").unwrap().author.as_deref(), Some("y"));
    }

    #[test]
    fn test_rows_cover_every_message() {
        let mut g = RumourGraph::new();
        let root = message(&mut g, "root");
        let a = message(&mut g, "a");
        reply(&mut g, a, root, 2);
        author(&mut g, "lonely");

        let table = extract_all(&g).unwrap();
        assert_eq!(table.len(), 2);
        let root_row = table.get("root").unwrap();
        assert_eq!(root_row.hour, 11);
        assert_eq!(root_row.retweets, 2);
        assert!(!root_row.is_reply);
        assert!(table.get("a").unwrap().is_reply);
        assert_eq!(root_row.sentiment, crate::Sentiment::Neutral);
    }

    #[test]
    fn test_bad_timestamp_fails_the_run() {
        let mut g = RumourGraph::new();
        message(&mut g, "ok");
        g.ensure_message(MessageNode {
            id: "bad".to_string(),
            text: String::new(),
            created_at: "Wed Jan 07".to_string(),
            is_rumour: true,
        });
        assert!(matches!(
            extract_all(&g),
            Err(FeatureError::Timestamp { message_id, .. }) if message_id == "bad"
        ));
    }
}

//! Author activity and influence report
//!
//! `rumour_involved` is derived from edges on every call, never stored on
//! author nodes.
//!
//! Betweenness is Brandes' algorithm over the whole directed graph
//! (unweighted), normalized by `1 / ((n - 1)(n - 2))`. Sources are processed
//! in parallel; each source contributes its own dependency vector and the
//! vectors are summed at the end.

use std::collections::VecDeque;
use std::path::Path;

use rayon::prelude::*;
use rumourgraph_graph::{EdgeKind, NodeId, RumourGraph};
use serde::{Deserialize, Serialize};

use crate::table::write_atomically;
use crate::{FeatureError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub handle: String,
    pub name: String,
    pub author_id: String,
    /// Messages this author posted.
    pub posted: usize,
    /// Messages mentioning this author.
    pub mentioned: usize,
    /// Posted, or was mentioned by, at least one rumour message.
    pub rumour_involved: bool,
    pub betweenness: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorReport {
    /// Sorted by handle.
    pub authors: Vec<AuthorSummary>,
}

impl AuthorReport {
    pub fn get(&self, handle: &str) -> Option<&AuthorSummary> {
        self.authors
            .binary_search_by(|a| a.handle.as_str().cmp(handle))
            .ok()
            .map(|i| &self.authors[i])
    }

    /// The `limit` most central authors, ties broken by handle.
    pub fn top_by_betweenness(&self, limit: usize) -> Vec<&AuthorSummary> {
        let mut ranked: Vec<&AuthorSummary> = self.authors.iter().collect();
        ranked.sort_by(|a, b| {
            b.betweenness
                .total_cmp(&a.betweenness)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        ranked.truncate(limit);
        ranked
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |out| {
            serde_json::to_writer_pretty(&mut *out, self).map_err(|e| FeatureError::json(path, e))
        })?;
        tracing::info!(path = %path.display(), authors = self.authors.len(), "wrote author report");
        Ok(())
    }
}

pub fn author_report(graph: &RumourGraph) -> AuthorReport {
    let centrality = betweenness_centrality(graph);

    let mut authors: Vec<AuthorSummary> = graph
        .author_ids()
        .filter_map(|id| {
            let author = graph.author(id)?;
            let posted: Vec<NodeId> = graph
                .outgoing(id, EdgeKind::Posted)
                .map(|e| e.target)
                .collect();
            let mentioned_by: Vec<NodeId> = graph
                .incoming(id, EdgeKind::Mention)
                .map(|e| e.source)
                .collect();
            let rumour_involved = posted
                .iter()
                .chain(&mentioned_by)
                .filter_map(|&m| graph.message(m))
                .any(|m| m.is_rumour);

            Some(AuthorSummary {
                handle: author.handle.clone(),
                name: author.name.clone(),
                author_id: author.author_id.clone(),
                posted: posted.len(),
                mentioned: mentioned_by.len(),
                rumour_involved,
                betweenness: centrality[id.raw() as usize],
            })
        })
        .collect();
    authors.sort_by(|a, b| a.handle.cmp(&b.handle));

    tracing::info!(
        authors = authors.len(),
        rumour_involved = authors.iter().filter(|a| a.rumour_involved).count(),
        "built author report"
    );
    AuthorReport { authors }
}

/// Normalized betweenness of every node, indexed by raw node id.
pub fn betweenness_centrality(graph: &RumourGraph) -> Vec<f64> {
    let n = graph.node_count();
    let adjacency: Vec<Vec<usize>> = (0..n)
        .map(|v| {
            graph
                .successors(NodeId::new(v as u32))
                .map(|w| w.raw() as usize)
                .collect()
        })
        .collect();

    let mut centrality = (0..n)
        .into_par_iter()
        .map(|s| source_dependencies(&adjacency, s))
        .reduce(
            || vec![0.0; n],
            |mut acc, delta| {
                for (total, d) in acc.iter_mut().zip(delta) {
                    *total += d;
                }
                acc
            },
        );

    if n > 2 {
        let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
        for value in &mut centrality {
            *value *= scale;
        }
    }
    centrality
}

/// Dependency of `s` on every other node (one Brandes pass).
fn source_dependencies(adjacency: &[Vec<usize>], s: usize) -> Vec<f64> {
    let n = adjacency.len();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    sigma[s] = 1.0;
    dist[s] = 0;

    let mut queue = VecDeque::from([s]);
    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in &adjacency[v] {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    let mut out = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != s {
            out[w] = delta[w];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumourgraph_graph::{AuthorNode, MessageNode, Relation};

    fn message(g: &mut RumourGraph, id: &str, rumour: bool) -> NodeId {
        g.ensure_message(MessageNode {
            id: id.to_string(),
            text: String::new(),
            created_at: "2015-01-07 11:06:08".to_string(),
            is_rumour: rumour,
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

    #[test]
    fn test_betweenness_on_directed_path() {
        // a -> b -> c: only b lies on a shortest path (a to c).
        let mut g = RumourGraph::new();
        let a = author(&mut g, "a");
        let b = message(&mut g, "b", false);
        let c = author(&mut g, "c");
        g.upsert_edge(a, b, Relation::Posted);
        g.upsert_edge(b, c, Relation::Mention);

        let cb = betweenness_centrality(&g);
        assert_eq!(cb[a.raw() as usize], 0.0);
        assert!((cb[b.raw() as usize] - 0.5).abs() < 1e-12);
        assert_eq!(cb[c.raw() as usize], 0.0);
    }

    #[test]
    fn test_betweenness_splits_over_equal_paths() {
        // s -> {x, y} -> t: x and y each carry half of the s..t pair.
        let mut g = RumourGraph::new();
        let s = author(&mut g, "s");
        let x = message(&mut g, "x", false);
        let y = message(&mut g, "y", false);
        let t = message(&mut g, "t", false);
        g.upsert_edge(s, x, Relation::Posted);
        g.upsert_edge(s, y, Relation::Posted);
        g.upsert_edge(x, t, Relation::Replies { retweet: 0, favourite: 0 });
        g.upsert_edge(y, t, Relation::Replies { retweet: 0, favourite: 0 });

        let cb = betweenness_centrality(&g);
        let expected = 0.5 / 6.0;
        assert!((cb[x.raw() as usize] - expected).abs() < 1e-12);
        assert!((cb[y.raw() as usize] - expected).abs() < 1e-12);
        assert_eq!(cb[s.raw() as usize], 0.0);
    }

    #[test]
    fn test_report_counts_and_rumour_involvement() {
        let mut g = RumourGraph::new();
        let rumour = message(&mut g, "r", true);
        let plain = message(&mut g, "p", false);
        let y = author(&mut g, "y");
        let x = author(&mut g, "x");
        let z = author(&mut g, "z");
        let w = author(&mut g, "w");
        g.upsert_edge(y, rumour, Relation::Posted);
        g.upsert_edge(x, plain, Relation::Posted);
        g.upsert_edge(rumour, z, Relation::Mention);
        g.upsert_edge(plain, w, Relation::Mention);

        let report = author_report(&g);
        let handles: Vec<_> = report.authors.iter().map(|a| a.handle.as_str()).collect();
        assert_eq!(handles, vec!["w", "x", "y", "z"]);

        let y = report.get("y").unwrap();
        assert_eq!((y.posted, y.mentioned), (1, 0));
        assert!(y.rumour_involved);
        assert!(report.get("z").unwrap().rumour_involved);
        assert!(!report.get("x").unwrap().rumour_involved);
        assert!(!report.get("w").unwrap().rumour_involved);
        assert_eq!(report.get("w").unwrap().mentioned, 1);
    }

    #[test]
    fn test_top_by_betweenness_and_write() {
        let mut g = RumourGraph::new();
        // a -> m -> b -> n: b sits between m and n.
        let m = message(&mut g, "m", false);
        let n = message(&mut g, "n", false);
        let a = author(&mut g, "a");
        let b = author(&mut g, "b");
        g.upsert_edge(a, m, Relation::Posted);
        g.upsert_edge(m, b, Relation::Mention);
        g.upsert_edge(b, n, Relation::Posted);

        let report = author_report(&g);
        let top = report.top_by_betweenness(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].handle, "b");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authors.json");
        report.write(&path).unwrap();
        let restored: AuthorReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored, report);
    }
}

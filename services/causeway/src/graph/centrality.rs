use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::VecDeque;

use super::CausalGraph;

/// Hop distance from every node that can reach `target`, the target itself
/// included at distance 0. Nodes with no path are absent.
pub fn distances_to(graph: &CausalGraph, target: &str) -> Vec<(String, usize)> {
    let Some(t) = graph.node_index(target) else {
        return Vec::new();
    };
    let inner = graph.inner();
    let mut dist: Vec<Option<usize>> = vec![None; inner.node_count()];
    dist[t.index()] = Some(0);

    let mut queue = VecDeque::from([t]);
    while let Some(v) = queue.pop_front() {
        let d = dist[v.index()].unwrap_or(0);
        for u in inner.neighbors_directed(v, Direction::Incoming) {
            if dist[u.index()].is_none() {
                dist[u.index()] = Some(d + 1);
                queue.push_back(u);
            }
        }
    }

    inner
        .node_indices()
        .filter_map(|i| dist[i.index()].map(|d| (graph.name(i).to_string(), d)))
        .collect()
}

/// Normalized betweenness centrality for directed, unweighted graphs (Brandes).
///
/// Scores are scaled by `1 / ((n - 1)(n - 2))` when `n > 2` and left raw
/// otherwise.
pub fn betweenness_centrality(graph: &CausalGraph) -> Vec<(String, f64)> {
    let inner = graph.inner();
    let n = inner.node_count();
    let mut centrality = vec![0.0f64; n];

    for s in inner.node_indices() {
        let mut stack: Vec<NodeIndex> = Vec::with_capacity(n);
        let mut preds: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist: Vec<i64> = vec![-1; n];
        sigma[s.index()] = 1.0;
        dist[s.index()] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in inner.neighbors_directed(v, Direction::Outgoing) {
                if dist[w.index()] < 0 {
                    dist[w.index()] = dist[v.index()] + 1;
                    queue.push_back(w);
                }
                if dist[w.index()] == dist[v.index()] + 1 {
                    sigma[w.index()] += sigma[v.index()];
                    preds[w.index()].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w.index()] {
                delta[v.index()] += sigma[v.index()] / sigma[w.index()] * (1.0 + delta[w.index()]);
            }
            if w != s {
                centrality[w.index()] += delta[w.index()];
            }
        }
    }

    if n > 2 {
        let scale = 1.0 / ((n as f64 - 1.0) * (n as f64 - 2.0));
        for c in centrality.iter_mut() {
            *c *= scale;
        }
    }

    inner
        .node_indices()
        .map(|i| (graph.name(i).to_string(), centrality[i.index()]))
        .collect()
}

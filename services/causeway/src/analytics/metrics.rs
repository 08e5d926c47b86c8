//! Graph-vs-ground-truth metrics.
//!
//! Both graphs are projected onto adjacency matrices over the union of their
//! nodes (ground-truth nodes first, in insertion order). Edge weights are ignored.

use std::collections::VecDeque;

use crate::graph::CausalGraph;

type Adjacency = Vec<Vec<bool>>;

fn adjacency_pair(truth: &CausalGraph, predicted: &CausalGraph) -> (Adjacency, Adjacency) {
    let mut names: Vec<&str> = truth.nodes().collect();
    for node in predicted.nodes() {
        if !names.contains(&node) {
            names.push(node);
        }
    }
    (adjacency(truth, &names), adjacency(predicted, &names))
}

fn adjacency(graph: &CausalGraph, names: &[&str]) -> Adjacency {
    names
        .iter()
        .map(|u| names.iter().map(|v| graph.has_edge(u, v)).collect())
        .collect()
}

/// Structural Hamming distance. A pair of nodes whose connection differs counts
/// once, reversed edges included.
pub fn structural_hamming_distance(truth: &CausalGraph, predicted: &CausalGraph) -> f64 {
    let (t, p) = adjacency_pair(truth, predicted);
    let n = t.len();
    let mut distance = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            if t[i][j] != p[i][j] || t[j][i] != p[j][i] {
                distance += 1;
            }
        }
    }
    distance as f64
}

/// Area under the precision-recall curve (average precision) of the predicted
/// adjacency matrix scored against the true one.
pub fn auc_pr(truth: &CausalGraph, predicted: &CausalGraph) -> f64 {
    let (t, p) = adjacency_pair(truth, predicted);
    let total = (t.len() * t.len()) as f64;
    let positives = t.iter().flatten().filter(|&&b| b).count() as f64;
    if positives == 0.0 {
        return 0.0;
    }

    let predicted_edges = p.iter().flatten().filter(|&&b| b).count() as f64;
    let true_hits = t
        .iter()
        .flatten()
        .zip(p.iter().flatten())
        .filter(|&(a, b)| *a && *b)
        .count() as f64;

    // Binary scores leave two thresholds: predicted edges only, then everything.
    let mut ap = 0.0;
    let mut last_recall = 0.0;
    if predicted_edges > 0.0 {
        let recall = true_hits / positives;
        ap += recall * (true_hits / predicted_edges);
        last_recall = recall;
    }
    ap + (1.0 - last_recall) * (positives / total)
}

/// Structural intervention distance: the number of ordered pairs `(i, j)` for
/// which adjusting for the predicted parents of `i` would give a wrong
/// interventional distribution of `j` under the true graph.
pub fn structural_intervention_distance(truth: &CausalGraph, predicted: &CausalGraph) -> f64 {
    let (t, p) = adjacency_pair(truth, predicted);
    let n = t.len();
    let mut mistakes = 0usize;

    for i in 0..n {
        let parents: Vec<usize> = (0..n).filter(|&k| p[k][i]).collect();
        let descendants_of_i = descendants(&t, &[i]);

        for j in 0..n {
            if i == j {
                continue;
            }
            let correct = if parents.contains(&j) {
                // the predicted graph claims i has no effect on j
                !descendants_of_i[j]
            } else {
                is_valid_adjustment(&t, i, j, &parents, &descendants_of_i)
            };
            if !correct {
                mistakes += 1;
            }
        }
    }
    mistakes as f64
}

/// Adjustment criterion: no member of `z` descends from a node on a proper
/// causal path `i -> .. -> j`, and `z` d-separates `i` from `j` once the first
/// edges of those paths are cut.
fn is_valid_adjustment(
    adj: &Adjacency,
    i: usize,
    j: usize,
    z: &[usize],
    descendants_of_i: &[bool],
) -> bool {
    let n = adj.len();
    let ancestors_of_j = ancestors(adj, j);
    let on_causal_path: Vec<usize> = (0..n)
        .filter(|&w| w != i && descendants_of_i[w] && ancestors_of_j[w])
        .collect();

    let forbidden = descendants(adj, &on_causal_path);
    if z.iter().any(|&k| forbidden[k]) {
        return false;
    }

    let mut cut = adj.clone();
    for &w in &on_causal_path {
        cut[i][w] = false;
    }
    !d_connected(&cut, i, j, z)
}

/// Nodes reachable from `sources` along directed edges, sources included.
fn descendants(adj: &Adjacency, sources: &[usize]) -> Vec<bool> {
    let n = adj.len();
    let mut seen = vec![false; n];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for &s in sources {
        if !seen[s] {
            seen[s] = true;
            queue.push_back(s);
        }
    }
    while let Some(v) = queue.pop_front() {
        for w in 0..n {
            if adj[v][w] && !seen[w] {
                seen[w] = true;
                queue.push_back(w);
            }
        }
    }
    seen
}

fn ancestors(adj: &Adjacency, node: usize) -> Vec<bool> {
    let n = adj.len();
    let mut seen = vec![false; n];
    seen[node] = true;
    let mut queue = VecDeque::from([node]);
    while let Some(v) = queue.pop_front() {
        for w in 0..n {
            if adj[w][v] && !seen[w] {
                seen[w] = true;
                queue.push_back(w);
            }
        }
    }
    seen
}

/// Reachability with the Bayes-ball rules: is there an active trail from `x`
/// to `y` given the conditioning set `z`?
fn d_connected(adj: &Adjacency, x: usize, y: usize, z: &[usize]) -> bool {
    let n = adj.len();
    let mut observed = vec![false; n];
    for &k in z {
        observed[k] = true;
    }
    // observed nodes and their ancestors open colliders
    let mut opens_collider = vec![false; n];
    for &k in z {
        for (w, is_ancestor) in ancestors(adj, k).into_iter().enumerate() {
            opens_collider[w] |= is_ancestor;
        }
    }

    // (node, travelling up from a child)
    let mut visited = vec![[false; 2]; n];
    let mut queue = VecDeque::from([(x, true)]);
    while let Some((v, up)) = queue.pop_front() {
        let slot = usize::from(up);
        if visited[v][slot] {
            continue;
        }
        visited[v][slot] = true;
        if v == y && !observed[v] {
            return true;
        }

        if up {
            if !observed[v] {
                for w in 0..n {
                    if adj[w][v] {
                        queue.push_back((w, true));
                    }
                    if adj[v][w] {
                        queue.push_back((w, false));
                    }
                }
            }
        } else {
            if !observed[v] {
                for w in 0..n {
                    if adj[v][w] {
                        queue.push_back((w, false));
                    }
                }
            }
            if opens_collider[v] {
                for w in 0..n {
                    if adj[w][v] {
                        queue.push_back((w, true));
                    }
                }
            }
        }
    }
    false
}

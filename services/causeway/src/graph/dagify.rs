//! Turns raw discovery output into a DAG.
//!
//! Cycles are broken one at a time, always at the first elementary cycle in
//! enumeration order. Edges that lie on no cycle are never touched.

use tracing::debug;

use super::cycles::{count_cycles, first_cycle};
use super::CausalGraph;

pub fn dagify(graph: &CausalGraph) -> CausalGraph {
    resolve(graph.clone(), None)
}

/// Like [`dagify`], but edges pointing into `target` survive cycle breaking.
pub fn dagify_toward_target(graph: &CausalGraph, target: &str) -> CausalGraph {
    resolve(graph.clone(), Some(target))
}

fn resolve(mut graph: CausalGraph, target: Option<&str>) -> CausalGraph {
    while let Some(cycle) = first_cycle(&graph) {
        match cycle.as_slice() {
            [node] => {
                graph.remove_edge(node, node);
            }
            [u, v] => {
                // Mutual edge: keep u -> v, unless u is the target, in which case the
                // edge into the target wins.
                if target == Some(u.as_str()) {
                    graph.remove_edge(u, v);
                } else {
                    graph.remove_edge(v, u);
                }
            }
            _ => break_long_cycle(&mut graph, &cycle, target),
        }
    }
    graph
}

fn break_long_cycle(graph: &mut CausalGraph, cycle: &[String], target: Option<&str>) {
    // closing edge first, then the path edges
    let mut edges: Vec<(&str, &str)> = Vec::with_capacity(cycle.len());
    if let (Some(first), Some(last)) = (cycle.first(), cycle.last()) {
        edges.push((last.as_str(), first.as_str()));
    }
    edges.extend(cycle.windows(2).map(|w| (w[0].as_str(), w[1].as_str())));

    let candidates: Vec<(&str, &str)> = edges
        .iter()
        .copied()
        .filter(|(_, j)| Some(*j) != target)
        .collect();

    let mut weakest: Option<((&str, &str), f64)> = None;
    for (i, j) in candidates {
        let score = graph.score(i, j);
        if weakest.map_or(true, |(_, best)| score < best) {
            weakest = Some(((i, j), score));
        }
    }
    let Some(((i, j), score)) = weakest else {
        return;
    };

    let weight = graph.edge_weight(i, j).flatten();
    let before = count_cycles(graph);

    let mut reversed = graph.clone();
    reversed.remove_edge(i, j);
    reversed.set_edge(j, i, weight);
    let after = count_cycles(&reversed);

    if after < before {
        // an existing j -> i takes over the weight of the edge it replaces
        if graph.has_edge(j, i) {
            graph.set_edge(j, i, Some(score));
        } else {
            graph.set_edge(j, i, weight);
        }
        debug!("Reversed {} -> {} ({} -> {} cycles)", i, j, before, after);
    } else {
        debug!("Dropped {} -> {}", i, j);
    }
    graph.remove_edge(i, j);
}

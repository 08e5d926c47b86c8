use crate::graph::centrality::{betweenness_centrality, distances_to};
use crate::graph::CausalGraph;
use crate::knowledge::Knowledge;

/// Ranks a discovered graph by how much structure it puts around `target`.
///
/// Zero when the target is missing or the graph is not weakly connected.
pub fn priority_score(graph: &CausalGraph, target: &str) -> f64 {
    if !graph.has_node(target) {
        return 0.0;
    }

    let n = graph.node_count() as f64;
    let edge_score = graph.in_degree(target) as f64 / n;

    let distances = distances_to(graph, target);
    let avg_distance = if distances.is_empty() {
        0.0
    } else {
        distances.iter().map(|(_, d)| *d as f64).sum::<f64>() / distances.len() as f64
    };
    let distance_score = 1.0 / (avg_distance + 1.0);

    let connectivity_score = if graph.is_weakly_connected() { 1.0 } else { 0.0 };
    let betweenness_score: f64 = betweenness_centrality(graph).iter().map(|(_, c)| c).sum();

    100.0 * edge_score * distance_score * graph.density() * connectivity_score * betweenness_score
}

/// Share of forbidden edges present in the graph; 0 when none are forbidden.
pub fn forbidden_edges_violation_rate(graph: &CausalGraph, knowledge: &Knowledge) -> f64 {
    let forbidden = knowledge.forbidden_edges();
    if forbidden.is_empty() {
        return 0.0;
    }
    let violated = forbidden.iter().filter(|(u, v)| graph.has_edge(u, v)).count();
    violated as f64 / forbidden.len() as f64
}

/// Share of required edges present in the graph; 1 when none are required.
pub fn required_edges_compliance_rate(graph: &CausalGraph, knowledge: &Knowledge) -> f64 {
    let required = knowledge.required_edges();
    if required.is_empty() {
        return 1.0;
    }
    let present = required.iter().filter(|(u, v)| graph.has_edge(u, v)).count();
    present as f64 / required.len() as f64
}

pub fn graph_integrity_score(violation_rate: f64, compliance_rate: f64) -> f64 {
    (1.0 - violation_rate) * compliance_rate
}

/// Indices of `items` sorted by `score`, descending; ties keep their input order.
pub fn rank_descending<T, F>(items: &[T], score: F) -> Vec<usize>
where
    F: Fn(&T) -> f64,
{
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        score(&items[b])
            .partial_cmp(&score(&items[a]))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

//! Elementary-cycle enumeration.
//!
//! Every cycle is reported once, rooted at its lowest node index, with nodes in
//! traversal order. Enumeration order is fixed by node insertion order so the
//! "first" cycle of a graph is reproducible.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::ops::ControlFlow;

use super::CausalGraph;

/// Counting stops here; comparisons between two capped counts treat them as equal.
pub const CYCLE_COUNT_LIMIT: usize = 100_000;

/// First elementary cycle as node names, or `None` for a DAG.
pub fn first_cycle(graph: &CausalGraph) -> Option<Vec<String>> {
    let mut found = None;
    visit_cycles(graph, |cycle| {
        found = Some(cycle.iter().map(|&i| graph.name(i).to_string()).collect());
        ControlFlow::Break(())
    });
    found
}

/// Number of elementary cycles, saturating at [`CYCLE_COUNT_LIMIT`].
pub fn count_cycles(graph: &CausalGraph) -> usize {
    let mut count = 0usize;
    visit_cycles(graph, |_| {
        count += 1;
        if count >= CYCLE_COUNT_LIMIT {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    count
}

pub fn all_cycles(graph: &CausalGraph) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    visit_cycles(graph, |cycle| {
        cycles.push(cycle.iter().map(|&i| graph.name(i).to_string()).collect());
        if cycles.len() >= CYCLE_COUNT_LIMIT {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    cycles
}

fn visit_cycles<F>(graph: &CausalGraph, mut visit: F)
where
    F: FnMut(&[NodeIndex]) -> ControlFlow<()>,
{
    let inner = graph.inner();
    let n = inner.node_count();
    let mut on_path = vec![false; n];

    for start in inner.node_indices() {
        let mut path = vec![start];
        on_path[start.index()] = true;
        let flow = extend(graph, start, start, &mut path, &mut on_path, &mut visit);
        on_path[start.index()] = false;
        if flow.is_break() {
            return;
        }
    }
}

fn extend<F>(
    graph: &CausalGraph,
    start: NodeIndex,
    current: NodeIndex,
    path: &mut Vec<NodeIndex>,
    on_path: &mut [bool],
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&[NodeIndex]) -> ControlFlow<()>,
{
    let mut next: Vec<NodeIndex> = graph
        .inner()
        .neighbors_directed(current, Direction::Outgoing)
        .filter(|w| w.index() >= start.index())
        .collect();
    next.sort();
    next.dedup();

    for w in next {
        if w == start {
            visit(path)?;
        } else if !on_path[w.index()] {
            path.push(w);
            on_path[w.index()] = true;
            let flow = extend(graph, start, w, path, on_path, visit);
            on_path[w.index()] = false;
            path.pop();
            flow?;
        }
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dag_has_no_cycles() {
        let g = CausalGraph::from_edges([("A", "B"), ("B", "C"), ("A", "C")]);
        assert!(first_cycle(&g).is_none());
        assert_eq!(count_cycles(&g), 0);
    }

    #[test]
    fn test_counts_each_cycle_once() {
        // A<->B and A->B->C->A
        let g = CausalGraph::from_edges([("A", "B"), ("B", "A"), ("B", "C"), ("C", "A")]);
        assert_eq!(count_cycles(&g), 2);
        let cycles = all_cycles(&g);
        assert!(cycles.contains(&vec!["A".to_string(), "B".to_string()]));
        assert!(cycles.contains(&vec!["A".to_string(), "B".to_string(), "C".to_string()]));
    }

    #[test]
    fn test_first_cycle_is_rooted_at_lowest_node() {
        let g = CausalGraph::from_edges([("X", "Y"), ("Y", "Z"), ("Z", "Y")]);
        assert_eq!(first_cycle(&g), Some(vec!["Y".to_string(), "Z".to_string()]));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = CausalGraph::from_edges([("A", "A"), ("A", "B")]);
        assert_eq!(first_cycle(&g), Some(vec!["A".to_string()]));
    }
}

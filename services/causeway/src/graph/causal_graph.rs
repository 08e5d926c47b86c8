use petgraph::algo::{connected_components, has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight attached to an edge by a discovery algorithm, if it reported one.
pub type EdgeWeight = Option<f64>;

/// Directed graph over named variables.
///
/// Nodes keep their insertion order, which every traversal in this crate relies on
/// for deterministic output. Parallel edges are never stored: adding an existing
/// edge only updates its weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphRecord", from = "GraphRecord")]
pub struct CausalGraph {
    graph: DiGraph<String, EdgeWeight>,
    index: HashMap<String, NodeIndex>,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut graph = Self::new();
        for (u, v) in edges {
            graph.add_edge(u, v);
        }
        graph
    }

    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, source: &str, target: &str) {
        self.set_edge(source, target, None);
    }

    pub fn add_weighted_edge(&mut self, source: &str, target: &str, weight: f64) {
        self.set_edge(source, target, Some(weight));
    }

    /// Inserts `source -> target` or, when present, overwrites its weight.
    pub fn set_edge(&mut self, source: &str, target: &str, weight: EdgeWeight) {
        let u = self.add_node(source);
        let v = self.add_node(target);
        match self.graph.find_edge(u, v) {
            Some(e) => self.graph[e] = weight,
            None => {
                self.graph.add_edge(u, v, weight);
            }
        }
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) -> bool {
        let (Some(&u), Some(&v)) = (self.index.get(source), self.index.get(target)) else {
            return false;
        };
        match self.graph.find_edge(u, v) {
            Some(e) => self.graph.remove_edge(e).is_some(),
            None => false,
        }
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&u), Some(&v)) => self.graph.find_edge(u, v).is_some(),
            _ => false,
        }
    }

    /// Reported weight of an edge; `None` when the edge is missing.
    pub fn edge_weight(&self, source: &str, target: &str) -> Option<EdgeWeight> {
        let u = *self.index.get(source)?;
        let v = *self.index.get(target)?;
        self.graph.find_edge(u, v).map(|e| self.graph[e])
    }

    /// Weight used for ranking cycle edges: the reported weight, or 1.
    pub fn score(&self, source: &str, target: &str) -> f64 {
        self.edge_weight(source, target).flatten().unwrap_or(1.0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(move |i| self.graph[i].as_str())
    }

    pub fn edges(&self) -> Vec<(&str, &str, EdgeWeight)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
            .collect();
        edges.sort_by_key(|(u, v, _)| (u.index(), v.index()));
        edges
            .into_iter()
            .map(|(u, v, w)| (self.graph[u].as_str(), self.graph[v].as_str(), w))
            .collect()
    }

    pub fn in_degree(&self, name: &str) -> usize {
        self.index
            .get(name)
            .map(|&i| self.graph.neighbors_directed(i, Direction::Incoming).count())
            .unwrap_or(0)
    }

    /// Direct causes of `name`, in node order.
    pub fn parents(&self, name: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(name) else {
            return Vec::new();
        };
        let mut parents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(i, Direction::Incoming)
            .collect();
        parents.sort();
        parents.into_iter().map(|p| self.graph[p].as_str()).collect()
    }

    /// True when a directed path leads from `source` to `target`.
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&u), Some(&v)) => has_path_connecting(&self.graph, u, v, None),
            _ => false,
        }
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Connected when edge directions are ignored. The empty graph is not connected.
    pub fn is_weakly_connected(&self) -> bool {
        self.node_count() > 0 && connected_components(&self.graph) == 1
    }

    /// Directed density `m / (n (n - 1))`; zero for graphs with fewer than two nodes.
    pub fn density(&self) -> f64 {
        let n = self.node_count() as f64;
        if n <= 1.0 {
            return 0.0;
        }
        self.edge_count() as f64 / (n * (n - 1.0))
    }

    pub(crate) fn inner(&self) -> &DiGraph<String, EdgeWeight> {
        &self.graph
    }

    pub(crate) fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub(crate) fn name(&self, idx: NodeIndex) -> &str {
        self.graph[idx].as_str()
    }
}

impl PartialEq for CausalGraph {
    fn eq(&self, other: &Self) -> bool {
        let mut a: Vec<&str> = self.nodes().collect();
        let mut b: Vec<&str> = other.nodes().collect();
        a.sort_unstable();
        b.sort_unstable();
        if a != b {
            return false;
        }
        let mut ea = self.edges();
        let mut eb = other.edges();
        ea.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        eb.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        ea == eb
    }
}

/// Serialized form: node list plus edge list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphRecord {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl From<CausalGraph> for GraphRecord {
    fn from(graph: CausalGraph) -> Self {
        Self {
            nodes: graph.nodes().map(|n| n.to_string()).collect(),
            edges: graph
                .edges()
                .into_iter()
                .map(|(u, v, w)| EdgeRecord {
                    source: u.to_string(),
                    target: v.to_string(),
                    weight: w,
                })
                .collect(),
        }
    }
}

impl From<GraphRecord> for CausalGraph {
    fn from(record: GraphRecord) -> Self {
        let mut graph = CausalGraph::new();
        for node in &record.nodes {
            graph.add_node(node);
        }
        for edge in &record.edges {
            graph.set_edge(&edge.source, &edge.target, edge.weight);
        }
        graph
    }
}

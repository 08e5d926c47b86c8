use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

use super::traits::{AlgorithmError, DiscoveryAlgorithm};
use crate::analytics::regression::correlation;
use crate::dataset::Dataset;
use crate::graph::CausalGraph;

pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.3;

/// Stand-in algorithm for runs without a discovery worker.
///
/// Links every treatment candidate whose absolute correlation with the target
/// reaches the threshold, weighted by that correlation.
#[derive(Debug, Clone)]
pub struct MockDiscovery {
    threshold: f64,
}

impl MockDiscovery {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for MockDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_THRESHOLD)
    }
}

#[async_trait]
impl DiscoveryAlgorithm for MockDiscovery {
    async fn infer(&self, dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        let target = dataset.target();
        let y = dataset.numeric_column(target)?;

        let mut graph = CausalGraph::new();
        for name in dataset.feature_names() {
            graph.add_node(name);
        }
        graph.add_node(target);

        for name in dataset.informative_features() {
            let x = dataset.numeric_column(name)?;
            let r = correlation(&x, &y).abs();
            if r.is_finite() && r >= self.threshold {
                graph.add_weighted_edge(name, target, r);
            }
        }
        Ok(graph)
    }
}

/// Returns a fixed graph, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    graph: CausalGraph,
    delay: Option<Duration>,
}

impl StaticDiscovery {
    pub fn new(graph: CausalGraph) -> Self {
        Self { graph, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl DiscoveryAlgorithm for StaticDiscovery {
    async fn infer(&self, _dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        Ok(self.graph.clone())
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::Dataset;
use crate::graph::CausalGraph;
use crate::knowledge::Knowledge;
use crate::results::{DiscoveryResult, EstimationResult, RefutationResult};

/// Discovery method name to its result; `None` when the method timed out or failed.
pub type DiscoveryResults = BTreeMap<String, Option<DiscoveryResult>>;
/// Discovery method name to the estimates computed on its graph.
pub type EstimationResults = BTreeMap<String, Option<Vec<EstimationResult>>>;
/// Discovery method name to the refutations of its estimates.
pub type RefutationResults = BTreeMap<String, Vec<RefutationResult>>;

/// Snapshot of a pipeline run.
///
/// Stages never modify a `Problem`; each returns a new one carrying its results.
/// Cloning is cheap since dataset columns are shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    dataset: Dataset,
    #[serde(default)]
    knowledge: Knowledge,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ground_truth: Option<CausalGraph>,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    discovery_results: Option<DiscoveryResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    estimation_results: Option<EstimationResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refutation_results: Option<RefutationResults>,
}

impl Problem {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            knowledge: Knowledge::empty(),
            ground_truth: None,
            description: String::new(),
            discovery_results: None,
            estimation_results: None,
            refutation_results: None,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    pub fn ground_truth(&self) -> Option<&CausalGraph> {
        self.ground_truth.as_ref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn discovery_results(&self) -> Option<&DiscoveryResults> {
        self.discovery_results.as_ref()
    }

    pub fn estimation_results(&self) -> Option<&EstimationResults> {
        self.estimation_results.as_ref()
    }

    pub fn refutation_results(&self) -> Option<&RefutationResults> {
        self.refutation_results.as_ref()
    }

    pub fn with_dataset(&self, dataset: Dataset) -> Self {
        Self {
            dataset,
            ..self.clone()
        }
    }

    pub fn with_knowledge(&self, knowledge: Knowledge) -> Self {
        Self {
            knowledge,
            ..self.clone()
        }
    }

    pub fn with_ground_truth(&self, ground_truth: Option<CausalGraph>) -> Self {
        Self {
            ground_truth,
            ..self.clone()
        }
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self.clone()
        }
    }

    pub fn with_discovery_results(&self, results: DiscoveryResults) -> Self {
        Self {
            discovery_results: Some(results),
            ..self.clone()
        }
    }

    pub fn with_estimation_results(&self, results: EstimationResults) -> Self {
        Self {
            estimation_results: Some(results),
            ..self.clone()
        }
    }

    pub fn with_refutation_results(&self, results: RefutationResults) -> Self {
        Self {
            refutation_results: Some(results),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureType, FeatureTypeMap};
    use polars::prelude::*;

    fn problem() -> Problem {
        let frame = df!("A" => &[1.0, 2.0, 3.0], "B" => &[3.0, 1.0, 2.0]).unwrap();
        let dataset = Dataset::new(frame, "B", vec![FeatureTypeMap::new("A", FeatureType::Continuous)]).unwrap();
        Problem::new(dataset)
    }

    #[test]
    fn test_problem_defaults() {
        let p = problem();
        assert!(p.knowledge().required_edges().is_empty());
        assert!(p.ground_truth().is_none());
        assert_eq!(p.description(), "");
        assert!(p.discovery_results().is_none());
        assert!(p.estimation_results().is_none());
        assert!(p.refutation_results().is_none());
    }

    #[test]
    fn test_with_results_leaves_input_untouched() {
        let p = problem();
        let mut results = DiscoveryResults::new();
        results.insert("PC".to_string(), None);

        let next = p.with_discovery_results(results).with_description("run 1");
        assert!(p.discovery_results().is_none());
        assert_eq!(next.discovery_results().map(|r| r.len()), Some(1));
        assert_eq!(next.description(), "run 1");
        assert_eq!(next.dataset().target(), "B");
    }

    #[test]
    fn test_problem_serde_roundtrip() {
        let p = problem()
            .with_knowledge(Knowledge::new(vec![], vec![("B".into(), "A".into())]))
            .with_ground_truth(Some(CausalGraph::from_edges([("A", "B")])));
        let json = serde_json::to_string(&p).unwrap();
        let restored: Problem = serde_json::from_str(&json).unwrap();
        assert!(restored.knowledge().is_forbidden("B", "A"));
        assert_eq!(restored.ground_truth(), p.ground_truth());
    }
}

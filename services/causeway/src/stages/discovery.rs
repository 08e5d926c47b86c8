use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::analytics::metrics::{auc_pr, structural_hamming_distance, structural_intervention_distance};
use crate::graph::{dagify, dagify_toward_target, CausalGraph};
use crate::methods::{AlgorithmError, DiscoveryMethod};
use crate::problem::{DiscoveryResults, Problem};
use crate::results::DiscoveryResult;
use crate::scheduler::dispatch::DEFAULT_KEEPALIVE;
use crate::scheduler::scoring::{
    forbidden_edges_violation_rate, graph_integrity_score, priority_score, required_edges_compliance_rate,
};
use crate::scheduler::{dispatch, Budget, DispatchOptions, EventSender, Stage};

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Hard limit per method.
    pub timeout: Duration,
    /// `0` means one worker per available CPU.
    pub worker_count: usize,
    pub orient_toward_target: bool,
    pub keepalive: Duration,
    pub events: Option<EventSender>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            worker_count: 0,
            orient_toward_target: true,
            keepalive: DEFAULT_KEEPALIVE,
            events: None,
        }
    }
}

/// Runs every method in `methods` on the problem's dataset.
///
/// The returned problem has one discovery entry per method, `None` for each
/// method that failed, crashed or ran out of time.
pub async fn run_discovery(methods: Vec<DiscoveryMethod>, problem: &Problem, options: &DiscoveryOptions) -> Problem {
    let shared = Arc::new(problem.clone());
    let orient = options.orient_toward_target;

    info!(
        "Running discovery for dataset {} with {} methods",
        problem.dataset().fingerprint(),
        methods.len()
    );

    let tasks: Vec<_> = methods
        .into_iter()
        .map(|method| {
            let problem = Arc::clone(&shared);
            let name = method.name().to_string();
            let task = move |_budget: Budget| async move {
                let started = Instant::now();
                let raw = method.infer(problem.dataset()).await?;
                let runtime = started.elapsed();
                Ok::<_, AlgorithmError>(evaluate(&problem, method.name(), &raw, runtime, orient))
            };
            (name, task)
        })
        .collect();

    let dispatch_options = DispatchOptions::new(Stage::Discovery, options.timeout)
        .with_worker_count(options.worker_count)
        .with_keepalive(options.keepalive)
        .with_events(options.events.clone());

    let results: DiscoveryResults = dispatch(&dispatch_options, tasks)
        .await
        .into_iter()
        .map(|report| (report.name, report.outcome.completed()))
        .collect();

    problem.with_discovery_results(results)
}

/// Turns a raw discovered graph into a scored result.
///
/// Graph metrics are only computed with a ground truth, and knowledge metrics
/// only when forbidden edges are given.
pub fn evaluate(problem: &Problem, method: &str, raw: &CausalGraph, runtime: Duration, orient: bool) -> DiscoveryResult {
    let target = problem.dataset().target();
    let graph = if orient {
        dagify_toward_target(raw, target)
    } else {
        dagify(raw)
    };
    let priority = priority_score(&graph, target);
    let mut result = DiscoveryResult::new(method, graph, runtime.as_secs_f64(), priority);

    if let Some(truth) = problem.ground_truth() {
        result.auc_pr = Some(auc_pr(truth, &result.output_graph));
        result.shd = Some(structural_hamming_distance(truth, &result.output_graph));
        result.sid = Some(structural_intervention_distance(truth, &result.output_graph));
    }

    let knowledge = problem.knowledge();
    if !knowledge.forbidden_edges().is_empty() {
        let violation = forbidden_edges_violation_rate(&result.output_graph, knowledge);
        let compliance = required_edges_compliance_rate(&result.output_graph, knowledge);
        result.forbidden_edges_violation_rate = Some(violation);
        result.required_edges_compliance_rate = Some(compliance);
        result.knowledge_integrity_score = Some(graph_integrity_score(violation, compliance));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, FeatureType, FeatureTypeMap};
    use crate::knowledge::Knowledge;
    use polars::prelude::*;
    use std::time::Duration;

    fn problem() -> Problem {
        let frame = df!(
            "A" => &[1.0, 2.0, 3.0, 4.0],
            "B" => &[2.0, 1.0, 4.0, 3.0],
            "C" => &[3.0, 5.0, 7.0, 9.0]
        )
        .unwrap();
        let mapping = vec![
            FeatureTypeMap::new("A", FeatureType::Continuous),
            FeatureTypeMap::new("B", FeatureType::Continuous),
        ];
        Problem::new(Dataset::new(frame, "C", mapping).unwrap())
    }

    #[test]
    fn test_evaluate_orients_and_scores() {
        let raw = CausalGraph::from_edges([("A", "B"), ("B", "C"), ("C", "B")]);
        let result = evaluate(&problem(), "PC", &raw, Duration::from_millis(1500), true);
        assert!(result.output_graph.is_acyclic());
        assert!(result.output_graph.has_edge("B", "C"));
        assert!(!result.output_graph.has_edge("C", "B"));
        assert!(result.priority_score > 0.0);
        assert_eq!(result.runtime_secs, 1.5);
        assert!(result.shd.is_none());
        assert!(result.knowledge_integrity_score.is_none());
    }

    #[test]
    fn test_evaluate_with_truth_and_knowledge() {
        let p = problem()
            .with_ground_truth(Some(CausalGraph::from_edges([("A", "B"), ("B", "C")])))
            .with_knowledge(Knowledge::new(
                vec![("A".into(), "B".into())],
                vec![("C".into(), "A".into()), ("A".into(), "C".into())],
            ));
        let raw = CausalGraph::from_edges([("A", "B"), ("B", "C"), ("A", "C")]);
        let result = evaluate(&p, "GS", &raw, Duration::ZERO, true);
        assert_eq!(result.shd, Some(1.0));
        assert!(result.auc_pr.is_some());
        assert!(result.sid.is_some());
        assert_eq!(result.forbidden_edges_violation_rate, Some(0.5));
        assert_eq!(result.required_edges_compliance_rate, Some(1.0));
        assert_eq!(result.knowledge_integrity_score, Some(0.5));
    }
}

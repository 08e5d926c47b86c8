use async_trait::async_trait;
use polars::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use causeway::dataset::{Dataset, FeatureType, FeatureTypeMap};
use causeway::graph::CausalGraph;
use causeway::knowledge::Knowledge;
use causeway::methods::{AlgorithmError, DiscoveryAlgorithm, DiscoveryMethod, MethodRegistry, StaticDiscovery};
use causeway::pipeline::{Pipeline, PipelineError};
use causeway::problem::{EstimationResults, Problem};
use causeway::report::{Layout, ReportError};
use causeway::results::{Estimand, EstimationResult};
use causeway::stages::{DiscoveryOptions, EstimationOptions, RefutationOptions};

struct Failing;

#[async_trait]
impl DiscoveryAlgorithm for Failing {
    async fn infer(&self, _dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        Err(AlgorithmError::Other("solver diverged".to_string()))
    }
}

struct Crashing;

#[async_trait]
impl DiscoveryAlgorithm for Crashing {
    async fn infer(&self, _dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        panic!("worker crashed")
    }
}

fn abc_problem() -> Problem {
    let frame = df!(
        "A" => &[1.0, 2.0, 3.0, 4.0, 5.0],
        "B" => &[5.0, 4.0, 3.0, 2.0, 1.0],
        "C" => &[2.0, 3.0, 4.0, 5.0, 6.0]
    )
    .unwrap();
    let mapping = vec![
        FeatureTypeMap::new("A", FeatureType::Continuous),
        FeatureTypeMap::new("B", FeatureType::Continuous),
    ];
    Problem::new(Dataset::new(frame, "C", mapping).unwrap())
}

/// Forty rows where C depends strongly on A and weakly on B; D is unrelated.
fn linear_problem() -> Problem {
    let a: Vec<f64> = (0..40).map(|i| ((i * 7) % 13) as f64).collect();
    let b: Vec<f64> = (0..40).map(|i| ((i * 3) % 7) as f64).collect();
    let d: Vec<f64> = (0..40).map(|i| if (i / 2) % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let c: Vec<f64> = (0..40).map(|i| 2.0 * a[i] + 0.5 * b[i] + (i % 3) as f64 * 0.1).collect();
    let frame = df!("A" => a, "B" => b, "D" => d, "C" => c).unwrap();
    let mapping = vec![
        FeatureTypeMap::new("A", FeatureType::Continuous),
        FeatureTypeMap::new("B", FeatureType::Continuous),
        FeatureTypeMap::new("D", FeatureType::Continuous),
    ];
    Problem::new(Dataset::new(frame, "C", mapping).unwrap())
}

fn method(name: &str, algorithm: Arc<dyn DiscoveryAlgorithm>) -> DiscoveryMethod {
    DiscoveryMethod::new(name, &FeatureType::ALL, false, false, algorithm)
}

#[tokio::test]
async fn test_single_deterministic_method() {
    let graph = CausalGraph::from_edges([("A", "C"), ("B", "C")]);
    let registry = MethodRegistry::new().register(method("FIXED", Arc::new(StaticDiscovery::new(graph))));
    let pipeline = Pipeline::new(registry);

    let out = pipeline.run_discovery(&abc_problem(), &DiscoveryOptions::default()).await;
    let results = out.discovery_results().unwrap();
    assert_eq!(results.len(), 1);
    let result = results["FIXED"].as_ref().unwrap();
    assert!(result.output_graph.has_node("C"));
    assert!(result.priority_score > 0.0);
    assert!(result.shd.is_none());
}

#[tokio::test]
async fn test_graph_without_target_scores_zero() {
    let graph = CausalGraph::from_edges([("A", "B")]);
    let registry = MethodRegistry::new().register(method("NO_TARGET", Arc::new(StaticDiscovery::new(graph))));
    let out = Pipeline::new(registry)
        .run_discovery(&abc_problem(), &DiscoveryOptions::default())
        .await;
    let result = out.discovery_results().unwrap()["NO_TARGET"].clone().unwrap();
    assert_eq!(result.priority_score, 0.0);
}

#[tokio::test]
async fn test_discovery_keys_survive_timeouts_and_crashes() {
    let graph = CausalGraph::from_edges([("A", "C")]);
    let registry = MethodRegistry::new()
        .register(method("FAST", Arc::new(StaticDiscovery::new(graph.clone()))))
        .register(method(
            "SLOW",
            Arc::new(StaticDiscovery::new(graph).with_delay(Duration::from_secs(30))),
        ))
        .register(method("FAILING", Arc::new(Failing)))
        .register(method("CRASHING", Arc::new(Crashing)))
        .register(DiscoveryMethod::new(
            "CATEGORICAL_ONLY",
            &[FeatureType::Categorical],
            false,
            false,
            Arc::new(Failing),
        ));
    let pipeline = Pipeline::new(registry);
    let problem = abc_problem();

    let applicable = pipeline.applicable_methods(&problem);
    assert_eq!(applicable, vec!["FAST", "SLOW", "FAILING", "CRASHING"]);

    let options = DiscoveryOptions {
        timeout: Duration::from_millis(200),
        worker_count: 2,
        ..DiscoveryOptions::default()
    };
    let started = Instant::now();
    let out = pipeline.run_discovery(&problem, &options).await;
    // two rounds of 200ms on two workers plus overhead
    assert!(started.elapsed() < Duration::from_secs(5));

    let results = out.discovery_results().unwrap();
    let mut keys: Vec<&str> = results.keys().map(String::as_str).collect();
    let mut expected: Vec<&str> = applicable.iter().map(String::as_str).collect();
    keys.sort_unstable();
    expected.sort_unstable();
    assert_eq!(keys, expected);

    assert!(results["FAST"].is_some());
    assert!(results["SLOW"].is_none());
    assert!(results["FAILING"].is_none());
    assert!(results["CRASHING"].is_none());
    assert!(problem.discovery_results().is_none());
}

#[tokio::test]
async fn test_forbidden_edge_absent_gives_full_integrity() {
    let graph = CausalGraph::from_edges([("A", "C"), ("B", "C")]);
    let registry = MethodRegistry::new().register(method("FIXED", Arc::new(StaticDiscovery::new(graph))));
    let problem = abc_problem().with_knowledge(Knowledge::new(vec![], vec![("X".into(), "Y".into())]));

    let out = Pipeline::new(registry)
        .run_discovery(&problem, &DiscoveryOptions::default())
        .await;
    let result = out.discovery_results().unwrap()["FIXED"].clone().unwrap();
    assert_eq!(result.forbidden_edges_violation_rate, Some(0.0));
    assert_eq!(result.required_edges_compliance_rate, Some(1.0));
    assert_eq!(result.knowledge_integrity_score, Some(1.0));
}

#[tokio::test]
async fn test_full_run_with_mock_discovery() {
    let pipeline = Pipeline::new(MethodRegistry::mock(0.3));
    let problem = linear_problem().with_ground_truth(Some(CausalGraph::from_edges([("A", "C"), ("B", "C")])));
    let applicable = pipeline.applicable_methods(&problem);
    assert!(!applicable.is_empty());

    let discovered = pipeline.run_discovery(&problem, &DiscoveryOptions::default()).await;
    let discovery = discovered.discovery_results().unwrap();
    assert_eq!(discovery.len(), applicable.len());
    for result in discovery.values() {
        let result = result.as_ref().unwrap();
        assert!(result.output_graph.has_edge("A", "C"));
        assert!(!result.output_graph.has_edge("D", "C"));
        assert!(result.shd.is_some());
    }

    let estimated = pipeline
        .run_estimation(&discovered, &EstimationOptions::default())
        .await
        .unwrap();
    let estimation = estimated.estimation_results().unwrap();
    assert_eq!(estimation.len(), discovery.len());
    let first = estimation.values().next().unwrap().as_ref().unwrap();
    let treatments: Vec<&str> = first.iter().map(|e| e.treatment.as_str()).collect();
    assert_eq!(treatments, vec!["A", "B", "D"]);
    let a = &first[0];
    assert!((a.estimate - 2.0).abs() < 0.1, "estimate of A was {}", a.estimate);
    // D has no path to the target in the mock graph
    assert_eq!(first[2].estimate, 0.0);

    let mut options = RefutationOptions::default();
    options.settings.simulations = 10;
    let refuted = pipeline.run_refutation(&estimated, &options).await.unwrap();
    let refutation = refuted.refutation_results().unwrap();
    assert_eq!(refutation.len(), estimation.len());
    for (method, results) in refutation {
        let estimates = estimation[method].as_ref().map(|e| e.len()).unwrap_or(0);
        assert_eq!(results.len(), estimates * 3);
    }

    let graphs = pipeline.render(&refuted, Layout::Dot).unwrap();
    assert_eq!(graphs.len(), discovery.len());
    assert!(graphs.values().all(|g| g.as_ref().is_some_and(|dot| dot.contains("\"A\" -> \"C\""))));

    // earlier snapshots are untouched
    assert!(discovered.estimation_results().is_none());
    assert!(estimated.refutation_results().is_none());
}

#[tokio::test]
async fn test_refutation_global_budget_returns_early() {
    let problem = linear_problem();
    let estimate = |treatment: &str, value: f64| EstimationResult {
        method: "PC".to_string(),
        treatment: treatment.to_string(),
        estimand: Estimand {
            treatment: treatment.to_string(),
            outcome: "C".to_string(),
            backdoor_set: vec![],
            identified: true,
        },
        estimate: value,
        control_value: 0.0,
        treatment_value: 1.0,
        p_value: None,
    };
    let mut estimates = EstimationResults::new();
    estimates.insert(
        "PC".to_string(),
        Some(vec![estimate("A", 2.0), estimate("B", 0.5), estimate("D", 0.0)]),
    );
    estimates.insert("GS".to_string(), None);
    let problem = problem.with_estimation_results(estimates);

    let mut options = RefutationOptions {
        global_budget: Duration::from_millis(100),
        worker_count: 2,
        ..RefutationOptions::default()
    };
    options.settings.simulations = 50_000_000;

    let started = Instant::now();
    let out = Pipeline::new(MethodRegistry::new())
        .run_refutation(&problem, &options)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let results = out.refutation_results().unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["GS", "PC"]);
    assert!(results["PC"].is_empty());
    assert!(results["GS"].is_empty());
}

#[tokio::test]
async fn test_stage_order_is_enforced() {
    let pipeline = Pipeline::new(MethodRegistry::new());
    let problem = abc_problem();

    assert!(matches!(
        pipeline.run_refutation(&problem, &RefutationOptions::default()).await,
        Err(PipelineError::MissingStage { .. })
    ));
    assert_eq!(
        pipeline.render(&problem, Layout::Dot).unwrap_err(),
        ReportError::PreconditionFailed("discovery")
    );

    let discovered = pipeline.run_discovery(&problem, &DiscoveryOptions::default()).await;
    assert!(discovered.discovery_results().unwrap().is_empty());
    let estimated = pipeline
        .run_estimation(&discovered, &EstimationOptions::default())
        .await
        .unwrap();
    assert_eq!(
        pipeline.render(&estimated, Layout::Dot).unwrap_err(),
        ReportError::PreconditionFailed("refutation")
    );
}

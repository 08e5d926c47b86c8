//! Entry points for running the pipeline one stage at a time.
//!
//! Every stage takes a [`Problem`] and returns a new one with that stage's
//! results attached. Nothing is mutated in place, so a stage can be retried on
//! the same input.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::effects::{BackdoorLinearRegression, Estimator};
use crate::methods::MethodRegistry;
use crate::problem::Problem;
use crate::report::{render_all, Layout, ReportError};
use crate::results::DiscoveryResult;
use crate::stages::{self, DiscoveryOptions, EstimationOptions, RefutationOptions};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{stage} needs {missing} results; run {missing} first")]
    MissingStage {
        stage: &'static str,
        missing: &'static str,
    },
}

#[derive(Clone)]
pub struct Pipeline {
    registry: MethodRegistry,
    estimator: Arc<dyn Estimator>,
}

impl Pipeline {
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry,
            estimator: Arc::new(BackdoorLinearRegression),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn Estimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Names of the registry methods whose assumptions hold for the dataset.
    pub fn applicable_methods(&self, problem: &Problem) -> Vec<String> {
        self.registry
            .applicable_methods(problem.dataset())
            .into_iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub async fn run_discovery(&self, problem: &Problem, options: &DiscoveryOptions) -> Problem {
        let methods: Vec<_> = self
            .registry
            .applicable_methods(problem.dataset())
            .into_iter()
            .cloned()
            .collect();
        let out = stages::run_discovery(methods, problem, options).await;
        if let Some(results) = out.discovery_results() {
            let found = results.values().filter(|r| r.is_some()).count();
            info!("Discovery finished: {} of {} methods produced a graph", found, results.len());
        }
        out
    }

    pub async fn run_estimation(&self, problem: &Problem, options: &EstimationOptions) -> Result<Problem, PipelineError> {
        let discovered: Vec<DiscoveryResult> = problem
            .discovery_results()
            .ok_or(PipelineError::MissingStage {
                stage: "estimation",
                missing: "discovery",
            })?
            .values()
            .flatten()
            .cloned()
            .collect();
        Ok(stages::run_estimation(Arc::clone(&self.estimator), problem, discovered, options).await)
    }

    pub async fn run_refutation(&self, problem: &Problem, options: &RefutationOptions) -> Result<Problem, PipelineError> {
        let estimates = problem.estimation_results().ok_or(PipelineError::MissingStage {
            stage: "refutation",
            missing: "estimation",
        })?;
        Ok(stages::run_refutation(problem, estimates, options).await)
    }

    /// DOT text per discovery method. Needs all three stages to have run.
    pub fn render(&self, problem: &Problem, layout: Layout) -> Result<BTreeMap<String, Option<String>>, ReportError> {
        render_all(problem, layout)
    }
}

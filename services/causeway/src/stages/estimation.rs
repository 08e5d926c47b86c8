use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{run_blocking, TaskError};
use crate::effects::Estimator;
use crate::problem::{EstimationResults, Problem};
use crate::results::{DiscoveryResult, EstimationResult};
use crate::scheduler::dispatch::DEFAULT_KEEPALIVE;
use crate::scheduler::scoring::rank_descending;
use crate::scheduler::{dispatch, Budget, DispatchOptions, EventSender, Stage};

pub const DEFAULT_ESTIMATION_BUDGET: Duration = Duration::from_secs(360);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EstimationOptions {
    /// Soft limit per discovered graph; no new treatment is started past it.
    pub budget: Duration,
    /// Extra time granted past the budget before the task is given up on.
    pub grace: Duration,
    pub worker_count: usize,
    pub keepalive: Duration,
    pub events: Option<EventSender>,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            budget: DEFAULT_ESTIMATION_BUDGET,
            grace: DEFAULT_GRACE,
            worker_count: 0,
            keepalive: DEFAULT_KEEPALIVE,
            events: None,
        }
    }
}

/// Estimates every treatment candidate's effect on each discovered graph.
///
/// Graphs are submitted by priority score, highest first. The returned map has
/// one entry per successful discovery result.
pub async fn run_estimation(
    estimator: Arc<dyn Estimator>,
    problem: &Problem,
    discovered: Vec<DiscoveryResult>,
    options: &EstimationOptions,
) -> Problem {
    let shared = Arc::new(problem.clone());
    let order = rank_descending(&discovered, |r| r.priority_score);
    let mut discovered: Vec<Option<DiscoveryResult>> = discovered.into_iter().map(Some).collect();

    info!(
        "Estimating effects with {} on {} graphs",
        estimator.name(),
        discovered.len()
    );

    let tasks: Vec<_> = order
        .into_iter()
        .filter_map(|i| discovered[i].take())
        .map(|result| {
            let problem = Arc::clone(&shared);
            let estimator = Arc::clone(&estimator);
            let name = result.method.clone();
            let task = move |budget: Budget| {
                run_blocking(budget, move |budget| estimate_graph(estimator.as_ref(), &problem, &result, budget))
            };
            (name, task)
        })
        .collect();

    let dispatch_options = DispatchOptions::new(Stage::Estimation, options.budget + options.grace)
        .with_task_budget(options.budget)
        .with_worker_count(options.worker_count)
        .with_keepalive(options.keepalive)
        .with_events(options.events.clone());

    let results: EstimationResults = dispatch(&dispatch_options, tasks)
        .await
        .into_iter()
        .map(|report| (report.name, report.outcome.completed()))
        .collect();

    problem.with_estimation_results(results)
}

/// Estimates each treatment candidate in mapping order until the budget runs out.
pub fn estimate_graph(
    estimator: &dyn Estimator,
    problem: &Problem,
    discovered: &DiscoveryResult,
    budget: &Budget,
) -> Result<Vec<EstimationResult>, TaskError> {
    let dataset = problem.dataset();
    let candidates = dataset.treatment_candidates();
    let mut estimates = Vec::with_capacity(candidates.len());

    for treatment in candidates {
        if budget.token().is_cancelled() {
            debug!("Estimation for {} cancelled after {} treatments", discovered.method, estimates.len());
            break;
        }
        if budget.is_exhausted() {
            debug!(
                "Estimation budget of {} spent after {} treatments",
                discovered.method,
                estimates.len()
            );
            break;
        }
        estimates.push(estimator.estimate(&discovered.method, dataset, &discovered.output_graph, treatment)?);
    }
    Ok(estimates)
}

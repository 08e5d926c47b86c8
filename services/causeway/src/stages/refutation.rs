use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{run_blocking, TaskError};
use crate::effects::{refute_all, RefuterSettings};
use crate::problem::{EstimationResults, Problem, RefutationResults};
use crate::results::EstimationResult;
use crate::scheduler::dispatch::DEFAULT_KEEPALIVE;
use crate::scheduler::scoring::rank_descending;
use crate::scheduler::{dispatch, Budget, DispatchOptions, EventSender, Stage};

pub const DEFAULT_REFUTATION_GLOBAL_BUDGET: Duration = Duration::from_secs(180);
pub const DEFAULT_REFUTATION_MODEL_BUDGET: Duration = Duration::from_secs(25);

#[derive(Debug, Clone)]
pub struct RefutationOptions {
    /// Deadline for the whole stage; unfinished refutations are dropped.
    pub global_budget: Duration,
    /// Soft limit per estimate; no new refuter is started past it.
    pub model_budget: Duration,
    pub settings: RefuterSettings,
    pub worker_count: usize,
    pub keepalive: Duration,
    pub events: Option<EventSender>,
}

impl Default for RefutationOptions {
    fn default() -> Self {
        Self {
            global_budget: DEFAULT_REFUTATION_GLOBAL_BUDGET,
            model_budget: DEFAULT_REFUTATION_MODEL_BUDGET,
            settings: RefuterSettings::default(),
            worker_count: 0,
            keepalive: DEFAULT_KEEPALIVE,
            events: None,
        }
    }
}

/// Refutes every estimate, largest absolute effect first.
///
/// The returned map has one entry per key of `estimates`; a method whose
/// estimates were all lost to failures or the global deadline maps to an empty
/// list.
pub async fn run_refutation(problem: &Problem, estimates: &EstimationResults, options: &RefutationOptions) -> Problem {
    let shared = Arc::new(problem.clone());

    let flat: Vec<&EstimationResult> = estimates.values().flatten().flatten().collect();
    let order = submission_order(&flat);

    info!(
        "Refuting {} estimates within {:.0}s",
        flat.len(),
        options.global_budget.as_secs_f64()
    );

    let submitted: Vec<EstimationResult> = order.into_iter().map(|i| flat[i].clone()).collect();
    let owners: Vec<String> = submitted.iter().map(|e| e.method.clone()).collect();
    let tasks: Vec<_> = submitted
        .into_iter()
        .map(|estimate| {
            let problem = Arc::clone(&shared);
            let settings = options.settings;
            let name = format!("{}:{}", estimate.method, estimate.treatment);
            let task = move |budget: Budget| {
                run_blocking(budget, move |budget| {
                    refute_all(problem.dataset(), &estimate, &settings, budget).map_err(TaskError::from)
                })
            };
            (name, task)
        })
        .collect();

    // the global deadline is the only hard limit; the per-estimate budget is checked between refuters
    let dispatch_options = DispatchOptions::new(Stage::Refutation, options.global_budget)
        .with_task_budget(options.model_budget)
        .with_global_budget(Some(options.global_budget))
        .with_worker_count(options.worker_count)
        .with_keepalive(options.keepalive)
        .with_events(options.events.clone());

    let mut results: RefutationResults = estimates.keys().map(|k| (k.clone(), Vec::new())).collect();
    let reports = dispatch(&dispatch_options, tasks).await;
    for (owner, report) in owners.into_iter().zip(reports) {
        if let Some(refutations) = report.outcome.completed() {
            results.entry(owner).or_default().extend(refutations);
        }
    }

    problem.with_refutation_results(results)
}

/// Largest absolute effect first, whatever its sign; NaN estimates go last.
pub(crate) fn submission_order(estimates: &[&EstimationResult]) -> Vec<usize> {
    rank_descending(estimates, |e| {
        if e.estimate.is_nan() {
            f64::NEG_INFINITY
        } else {
            e.estimate.abs()
        }
    })
}

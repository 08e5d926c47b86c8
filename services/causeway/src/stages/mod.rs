//! The three pipeline stages, each a fan-out over the shared dispatcher.

pub mod discovery;
pub mod estimation;
pub mod refutation;

pub use discovery::{evaluate, run_discovery, DiscoveryOptions, DEFAULT_DISCOVERY_TIMEOUT};
pub use estimation::{estimate_graph, run_estimation, EstimationOptions, DEFAULT_ESTIMATION_BUDGET, DEFAULT_GRACE};
pub use refutation::{
    run_refutation, RefutationOptions, DEFAULT_REFUTATION_GLOBAL_BUDGET, DEFAULT_REFUTATION_MODEL_BUDGET,
};

use thiserror::Error;

use crate::effects::{EstimationError, RefutationError};
use crate::scheduler::Budget;

/// Failure of a single blocking stage task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("estimation failed: {0}")]
    Estimation(#[from] EstimationError),

    #[error("refutation failed: {0}")]
    Refutation(#[from] RefutationError),

    #[error("worker thread failed: {0}")]
    Join(String),
}

/// Runs CPU-bound work on the blocking pool. The budget moves onto the blocking
/// thread with the work, so its pool slot is released only when the work
/// returns, even after the dispatcher has given up on the task. A panic is
/// re-raised on the calling task so the dispatcher records it as a crash.
pub(crate) async fn run_blocking<T, F>(budget: Budget, work: F) -> Result<T, TaskError>
where
    F: FnOnce(&Budget) -> Result<T, TaskError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&budget)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(TaskError::Join(e.to_string())),
    }
}

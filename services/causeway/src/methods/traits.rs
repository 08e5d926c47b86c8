use async_trait::async_trait;
use polars::prelude::PolarsError;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError};
use crate::graph::CausalGraph;

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("method {0} cannot be used with this dataset")]
    NotApplicable(String),

    #[error("failed to launch worker `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for {method} exited with {status}: {stderr}")]
    WorkerFailed {
        method: String,
        status: String,
        stderr: String,
    },

    #[error("malformed worker output on line {line}: {content:?}")]
    MalformedOutput { line: usize, content: String },

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A causal-discovery algorithm: dataset in, directed graph out.
///
/// Implementations may be slow and need not be deterministic. They run under a
/// timeout and are dropped when it passes, so anything holding external
/// resources should release them on drop.
#[async_trait]
pub trait DiscoveryAlgorithm: Send + Sync {
    async fn infer(&self, dataset: &Dataset) -> Result<CausalGraph, AlgorithmError>;
}

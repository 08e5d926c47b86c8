pub mod analytics;
pub mod config;
pub mod dataset;
pub mod effects;
pub mod graph;
pub mod knowledge;
pub mod methods;
pub mod pipeline;
pub mod problem;
pub mod report;
pub mod results;
pub mod scheduler;
pub mod stages;
pub mod storage;

pub use dataset::{Dataset, DatasetError, FeatureType, FeatureTypeMap, MissingDataHandling};
pub use graph::CausalGraph;
pub use knowledge::{Knowledge, KnowledgeError};
pub use pipeline::{Pipeline, PipelineError};
pub use problem::Problem;

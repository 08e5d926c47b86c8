pub mod causal_graph;
pub mod centrality;
pub mod cycles;
pub mod dagify;

pub use causal_graph::{CausalGraph, EdgeRecord, EdgeWeight, GraphRecord};
pub use dagify::{dagify, dagify_toward_target};

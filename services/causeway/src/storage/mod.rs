pub mod loader;
pub mod state;

pub use loader::{load_dataset, load_graph, load_knowledge, read_frame, DatasetSpec};
pub use state::{load_problem, save_problem, summary_frame, write_summary_parquet};

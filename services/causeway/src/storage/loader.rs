//! Reading problem inputs from disk.
//!
//! A dataset is described by a TOML mapping file naming the target and the
//! mapped features:
//!
//! ```toml
//! target = "C"
//! missing = "drop"
//!
//! [[feature]]
//! feature = "A"
//! type = "CONTINUOUS"
//! ```
//!
//! Knowledge files are JSON objects with `required_edges` and `forbidden_edges`
//! lists of `[source, target]` pairs. Ground truth graphs are JSON, either a
//! `{ "nodes": [..], "edges": [..] }` record or a bare list of pairs.

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::dataset::{Dataset, FeatureTypeMap, MissingDataHandling};
use crate::graph::{CausalGraph, GraphRecord};
use crate::knowledge::Knowledge;

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSpec {
    pub target: String,
    /// Applied right after loading when set.
    #[serde(default)]
    pub missing: Option<MissingDataHandling>,
    #[serde(default, rename = "feature")]
    pub features: Vec<FeatureTypeMap>,
}

impl DatasetSpec {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read dataset mapping from {:?}", path.as_ref()))?;
        toml::from_str(&content).context("Failed to parse dataset mapping TOML")
    }
}

/// Reads a CSV or Parquet file, chosen by extension.
pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let frame = match extension.as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to open {:?}", path))?
            .finish()
            .with_context(|| format!("Failed to parse CSV {:?}", path))?,
        "parquet" | "pq" => {
            let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
            ParquetReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read Parquet {:?}", path))?
        }
        other => bail!("Unsupported data file extension '{}' for {:?}", other, path),
    };
    Ok(frame)
}

pub fn load_dataset<P: AsRef<Path>>(data_path: P, spec: &DatasetSpec) -> Result<Dataset> {
    let frame = read_frame(data_path.as_ref())?;
    info!(
        "Loaded {} rows x {} columns from {:?}",
        frame.height(),
        frame.width(),
        data_path.as_ref()
    );

    let dataset = Dataset::new(frame, &spec.target, spec.features.clone()).context("Invalid dataset")?;
    match spec.missing {
        Some(method) => dataset
            .handle_missing_data(method)
            .context("Failed to handle missing data"),
        None => Ok(dataset),
    }
}

pub fn load_knowledge<P: AsRef<Path>>(path: P) -> Result<Knowledge> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read knowledge from {:?}", path.as_ref()))?;
    let value: serde_json::Value = serde_json::from_str(&content).context("Knowledge file is not valid JSON")?;
    Knowledge::from_json_value(&value).context("Invalid knowledge file")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GraphFile {
    Record(GraphRecord),
    Pairs(Vec<(String, String)>),
}

pub fn load_graph<P: AsRef<Path>>(path: P) -> Result<CausalGraph> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read graph from {:?}", path.as_ref()))?;
    let parsed: GraphFile = serde_json::from_str(&content).context("Graph file is neither a record nor a pair list")?;
    Ok(match parsed {
        GraphFile::Record(record) => record.into(),
        GraphFile::Pairs(pairs) => CausalGraph::from_edges(pairs.iter().map(|(u, v)| (u.as_str(), v.as_str()))),
    })
}

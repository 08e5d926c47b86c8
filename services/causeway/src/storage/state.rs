use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::problem::Problem;

/// Writes the problem as JSON through a temp file and an atomic rename.
pub fn save_problem<P: AsRef<Path>>(problem: &Problem, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }

    let temp_file = path.with_extension("json.tmp");
    let file = File::create(&temp_file).with_context(|| format!("Failed to create temp file: {:?}", temp_file))?;
    serde_json::to_writer(std::io::BufWriter::new(file), problem).context("Failed to serialize problem")?;

    std::fs::rename(&temp_file, path).with_context(|| format!("Failed to rename {:?} to {:?}", temp_file, path))?;
    info!("Saved problem state to {:?}", path);
    Ok(())
}

pub fn load_problem<P: AsRef<Path>>(path: P) -> Result<Problem> {
    let file = File::open(path.as_ref()).with_context(|| format!("Failed to open state {:?}", path.as_ref()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse state {:?}", path.as_ref()))
}

/// One row per discovery method with its scores and the number of estimates
/// and refutations attached to it.
pub fn summary_frame(problem: &Problem) -> Result<DataFrame> {
    let Some(discovery) = problem.discovery_results() else {
        return Ok(DataFrame::empty());
    };

    let mut method = Vec::new();
    let mut succeeded = Vec::new();
    let mut runtime = Vec::new();
    let mut priority = Vec::new();
    let mut edges = Vec::new();
    let mut shd = Vec::new();
    let mut sid = Vec::new();
    let mut auc_pr = Vec::new();
    let mut integrity = Vec::new();
    let mut estimates = Vec::new();
    let mut refutations = Vec::new();
    let mut passed = Vec::new();

    for (name, result) in discovery {
        method.push(name.clone());
        succeeded.push(result.is_some());
        runtime.push(result.as_ref().map(|r| r.runtime_secs));
        priority.push(result.as_ref().map(|r| r.priority_score));
        edges.push(result.as_ref().map(|r| r.output_graph.edge_count() as u32));
        shd.push(result.as_ref().and_then(|r| r.shd));
        sid.push(result.as_ref().and_then(|r| r.sid));
        auc_pr.push(result.as_ref().and_then(|r| r.auc_pr));
        integrity.push(result.as_ref().and_then(|r| r.knowledge_integrity_score));

        estimates.push(
            problem
                .estimation_results()
                .and_then(|e| e.get(name))
                .and_then(|e| e.as_ref())
                .map(|e| e.len() as u32),
        );
        let refuted = problem.refutation_results().and_then(|r| r.get(name));
        refutations.push(refuted.map(|r| r.len() as u32));
        passed.push(refuted.map(|r| r.iter().filter(|x| x.passed).count() as u32));
    }

    DataFrame::new(vec![
        Series::new("method", method),
        Series::new("succeeded", succeeded),
        Series::new("runtime_secs", runtime),
        Series::new("priority_score", priority),
        Series::new("edges", edges),
        Series::new("shd", shd),
        Series::new("sid", sid),
        Series::new("auc_pr", auc_pr),
        Series::new("knowledge_integrity_score", integrity),
        Series::new("estimates", estimates),
        Series::new("refutations", refutations),
        Series::new("refutations_passed", passed),
    ])
    .context("Failed to create summary DataFrame")
}

/// Writes [`summary_frame`] as Parquet through a temp file and an atomic rename.
pub fn write_summary_parquet<P: AsRef<Path>>(problem: &Problem, path: P) -> Result<usize> {
    let path = path.as_ref();
    let mut frame = summary_frame(problem)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }

    let temp_file = path.with_extension("parquet.tmp");
    let file = File::create(&temp_file).with_context(|| format!("Failed to create temp file: {:?}", temp_file))?;
    ParquetWriter::new(file)
        .finish(&mut frame)
        .context("Failed to write Parquet file")?;
    std::fs::rename(&temp_file, path).with_context(|| format!("Failed to rename {:?} to {:?}", temp_file, path))?;

    info!("Wrote {} rows to {:?} (Parquet format)", frame.height(), path);
    Ok(frame.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, FeatureType, FeatureTypeMap};
    use crate::graph::CausalGraph;
    use crate::problem::{DiscoveryResults, RefutationResults};
    use crate::results::{DiscoveryResult, RefutationResult};
    use tempfile::TempDir;

    fn problem() -> Problem {
        let frame = df!("A" => &[1.0, 2.0, 3.0], "C" => &[2.0, 4.0, 6.5]).unwrap();
        let dataset = Dataset::new(frame, "C", vec![FeatureTypeMap::new("A", FeatureType::Continuous)]).unwrap();
        let mut discovery = DiscoveryResults::new();
        discovery.insert(
            "PC".into(),
            Some(DiscoveryResult::new("PC", CausalGraph::from_edges([("A", "C")]), 0.2, 12.5)),
        );
        discovery.insert("GS".into(), None);
        Problem::new(dataset).with_discovery_results(discovery)
    }

    #[test]
    fn test_state_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("state.json");
        let p = problem();
        save_problem(&p, &path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let restored = load_problem(&path).unwrap();
        let results = restored.discovery_results().unwrap();
        assert!(results["GS"].is_none());
        assert_eq!(results["PC"].as_ref().map(|r| r.priority_score), Some(12.5));
        assert_eq!(restored.dataset().height(), 3);
    }

    #[test]
    fn test_state_roundtrip_with_non_finite_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let mut refutations = RefutationResults::new();
        refutations.insert(
            "PC".into(),
            vec![RefutationResult::new("A", "PlaceboPermute", 1.0, f64::NAN, f64::NAN, None)],
        );
        let p = problem().with_refutation_results(refutations);
        save_problem(&p, &path).unwrap();

        let restored = load_problem(&path).unwrap();
        let result = &restored.refutation_results().unwrap()["PC"][0];
        assert_eq!(result.estimated_effect, 1.0);
        assert!(result.new_effect.is_nan());
        assert!(result.p_value.is_nan());
        assert!(!result.passed);
    }

    #[test]
    fn test_summary_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.parquet");
        assert_eq!(write_summary_parquet(&problem(), &path).unwrap(), 2);

        let frame = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        assert_eq!(frame.height(), 2);
        let succeeded = frame.column("succeeded").unwrap().bool().unwrap();
        // rows follow method name order
        assert_eq!(succeeded.get(0), Some(false));
        assert_eq!(succeeded.get(1), Some(true));
    }
}

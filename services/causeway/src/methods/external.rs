use async_trait::async_trait;
use polars::prelude::*;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::traits::{AlgorithmError, DiscoveryAlgorithm};
use crate::dataset::Dataset;
use crate::graph::CausalGraph;

/// Runs one discovery method in a separate worker process.
///
/// The worker is started as `program [args..] <method>`, receives the featured
/// columns as CSV with a header row on stdin, and prints one
/// `source,target[,weight]` edge per line on stdout. Blank lines, `#` comments
/// and a leading `source,target` header are ignored. The process is killed if
/// the task is dropped.
#[derive(Debug, Clone)]
pub struct ExternalDiscovery {
    method: String,
    program: String,
    args: Vec<String>,
}

impl ExternalDiscovery {
    pub fn new(method: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            method: method.into(),
            program: program.into(),
            args,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

#[async_trait]
impl DiscoveryAlgorithm for ExternalDiscovery {
    async fn infer(&self, dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        let mut frame = dataset.featured_only_data()?;
        let mut payload = Vec::new();
        CsvWriter::new(&mut payload)
            .include_header(true)
            .finish(&mut frame)?;

        debug!(
            "Launching {} {:?} {} with {} bytes of input",
            self.program,
            self.args,
            self.method,
            payload.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.method)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AlgorithmError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            return Err(AlgorithmError::WorkerFailed {
                method: self.method.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // a worker may exit successfully without reading all of its input
        if let Err(e) = fed {
            debug!("Worker for {} closed stdin early: {}", self.method, e);
        }

        let mut nodes: Vec<&str> = dataset.feature_names();
        nodes.push(dataset.target());
        parse_edge_list(&String::from_utf8_lossy(&output.stdout), &nodes)
    }
}

/// Parses worker output into a graph over `nodes` plus any node it mentions.
pub fn parse_edge_list(text: &str, nodes: &[&str]) -> Result<CausalGraph, AlgorithmError> {
    let mut graph = CausalGraph::new();
    for node in nodes {
        graph.add_node(node);
    }

    let mut seen_edge = false;
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !seen_edge && fields.len() >= 2 && fields[0] == "source" && fields[1] == "target" {
            continue;
        }

        let malformed = || AlgorithmError::MalformedOutput {
            line: i + 1,
            content: raw.to_string(),
        };
        match fields.as_slice() {
            [source, target] if !source.is_empty() && !target.is_empty() => {
                graph.add_edge(source, target);
            }
            [source, target, weight] if !source.is_empty() && !target.is_empty() => {
                let weight: f64 = weight.parse().map_err(|_| malformed())?;
                graph.add_weighted_edge(source, target, weight);
            }
            _ => return Err(malformed()),
        }
        seen_edge = true;
    }
    Ok(graph)
}

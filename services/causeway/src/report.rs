//! Graphviz rendering of a finished pipeline run.
//!
//! One DOT document per discovery method. Nodes carry their estimated effect,
//! coloured by its sign and by how many refuters it survived. The target is drawn
//! as a hexagon, forbidden edges in red and required edges the method missed as
//! dashed grey arrows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::FromStr;
use thiserror::Error;

use crate::effects::RefutationMethod;
use crate::problem::Problem;
use crate::results::{DiscoveryResult, EstimationResult, RefutationResult};

const GREEN: &str = "#4CAF50";
const AMBER: &str = "#FFC107";
const RED: &str = "#F44336";
const CYAN: &str = "#7EC1D7";
const LIGHT_BLUE: &str = "#ADD8E6";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("cannot render before {0} has run")]
    PreconditionFailed(&'static str),

    #[error("unknown layout '{0}'")]
    UnknownLayout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Dot,
    Fdp,
    Circo,
}

impl FromStr for Layout {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" | "default" => Ok(Layout::Dot),
            "fdp" => Ok(Layout::Fdp),
            "circo" => Ok(Layout::Circo),
            other => Err(ReportError::UnknownLayout(other.to_string())),
        }
    }
}

/// DOT text per discovery method; `None` for methods that produced no graph.
pub fn render_all(problem: &Problem, layout: Layout) -> Result<BTreeMap<String, Option<String>>, ReportError> {
    let discovery = problem
        .discovery_results()
        .ok_or(ReportError::PreconditionFailed("discovery"))?;
    let estimation = problem
        .estimation_results()
        .ok_or(ReportError::PreconditionFailed("estimation"))?;
    let refutation = problem
        .refutation_results()
        .ok_or(ReportError::PreconditionFailed("refutation"))?;

    let rendered = discovery
        .iter()
        .map(|(method, result)| {
            let dot = result.as_ref().map(|result| {
                let estimates = estimation.get(method).and_then(|e| e.as_deref()).unwrap_or(&[]);
                let refutations = refutation.get(method).map(Vec::as_slice).unwrap_or(&[]);
                render_graph(problem, result, estimates, refutations, layout)
            });
            (method.clone(), dot)
        })
        .collect();
    Ok(rendered)
}

pub fn render_graph(
    problem: &Problem,
    discovered: &DiscoveryResult,
    estimates: &[EstimationResult],
    refutations: &[RefutationResult],
    layout: Layout,
) -> String {
    let graph = &discovered.output_graph;
    let target = problem.dataset().target();
    let knowledge = problem.knowledge();

    let mut dot = String::new();
    dot.push_str("digraph G {\n");
    dot.push_str("fontname=\"Helvetica,Arial,sans-serif\";\n");
    dot.push_str(
        "node[style=\"filled\", fontsize=20, penwidth=2.5, fixedsize=true, fontcolor=\"black\", fillcolor=\"gray\", color=\"black\", shape=\"circle\"];\n",
    );
    dot.push_str("edge[penwidth=2, minlen=2];\n");
    match layout {
        Layout::Fdp => dot.push_str("layout=\"fdp\";\nsplines=\"compound\";\n"),
        Layout::Circo => dot.push_str("layout=\"circo\";\nsplines=\"polyline\";\n"),
        Layout::Dot => dot.push_str("splines=\"polyline\";\n"),
    }

    for node in graph.nodes() {
        let mut label = escape(node);
        let mut style: Vec<(&str, String)> = vec![("tooltip", escape(node))];

        if let Some(estimate) = estimates.iter().find(|e| e.treatment == node) {
            let survived: Vec<&RefutationResult> = refutations.iter().filter(|r| r.treatment == node).collect();
            style = node_style(estimate.estimate, &survived);
            label = format!("{}\\n{:.2}", escape(node), estimate.estimate);
        }
        if node == target {
            style = vec![
                ("fillcolor", "magenta".to_string()),
                ("color", "purple".to_string()),
                ("shape", "hexagon".to_string()),
                ("fontcolor", "white".to_string()),
            ];
        }

        let attrs: Vec<String> = style.iter().map(|(k, v)| format!("{}=\"{}\"", k, v)).collect();
        let _ = writeln!(
            dot,
            "   \"{}\"[width=1, height=1, label=\"{}\", {}];",
            escape(node),
            label,
            attrs.join(", ")
        );
    }

    for (u, v, _) in graph.edges() {
        let color = if knowledge.is_forbidden(u, v) { "red" } else { "black" };
        let _ = writeln!(dot, "   \"{}\" -> \"{}\"[color={}];", escape(u), escape(v), color);
    }

    for (u, v) in knowledge.required_edges() {
        if !graph.has_edge(u, v) {
            let _ = writeln!(
                dot,
                "   \"{}\" -> \"{}\"[color=\"lightgray\", style=\"dashed\"];",
                escape(u),
                escape(v)
            );
        }
    }

    dot.push('}');
    dot
}

/// Fill by effect sign, then by the share of passed refutations.
fn node_style(estimate: f64, refutations: &[&RefutationResult]) -> Vec<(&'static str, String)> {
    let passed = refutations.iter().filter(|r| r.passed).count();
    let rate = if refutations.is_empty() {
        0.0
    } else {
        passed as f64 / refutations.len() as f64
    };

    if estimate < 0.0 {
        vec![("fillcolor", "lightpink".to_string())]
    } else if estimate > 0.0 {
        if refutations.is_empty() {
            vec![
                ("fillcolor", format!("{};0.5:{}", LIGHT_BLUE, CYAN)),
                ("fontcolor", "black".to_string()),
            ]
        } else if rate < 0.33 {
            vec![("fillcolor", RED.to_string()), ("fontcolor", "white".to_string())]
        } else if passed == RefutationMethod::ALL.len() {
            vec![("fillcolor", GREEN.to_string()), ("fontcolor", "white".to_string())]
        } else {
            vec![("fillcolor", AMBER.to_string()), ("fontcolor", "black".to_string())]
        }
    } else {
        vec![
            ("fillcolor", "gray;0.25:lightgray;0.25:gray;0.25:lightgray;0.25".to_string()),
            ("color", "lightgray".to_string()),
            ("style", "wedged".to_string()),
            ("shape", "doublecircle".to_string()),
        ]
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

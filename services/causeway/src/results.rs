use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::CausalGraph;

/// Significance level separating passed from failed refutations.
pub const REFUTATION_PASS_THRESHOLD: f64 = 0.05;

/// JSON has no NaN or infinity: non-finite values are written as `null` and
/// read back as NaN.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_f64(*value)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub method: String,
    pub output_graph: CausalGraph,
    /// Time spent inside the discovery algorithm itself.
    pub runtime_secs: f64,
    pub priority_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auc_pr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_integrity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_edges_violation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_edges_compliance_rate: Option<f64>,
}

impl DiscoveryResult {
    pub fn new(method: impl Into<String>, output_graph: CausalGraph, runtime_secs: f64, priority_score: f64) -> Self {
        Self {
            method: method.into(),
            output_graph,
            runtime_secs,
            priority_score,
            auc_pr: None,
            shd: None,
            sid: None,
            knowledge_integrity_score: None,
            forbidden_edges_violation_rate: None,
            required_edges_compliance_rate: None,
        }
    }
}

impl fmt::Display for DiscoveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(v: Option<f64>) -> String {
            v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
        }
        writeln!(f, "{}", self.method)?;
        writeln!(f, "  runtime:           {:.3}s", self.runtime_secs)?;
        writeln!(f, "  priority score:    {:.4}", self.priority_score)?;
        writeln!(f, "  edges:             {}", self.output_graph.edge_count())?;
        writeln!(f, "  AUC-PR:            {}", opt(self.auc_pr))?;
        writeln!(f, "  SHD:               {}", opt(self.shd))?;
        writeln!(f, "  SID:               {}", opt(self.sid))?;
        writeln!(f, "  integrity score:   {}", opt(self.knowledge_integrity_score))?;
        writeln!(f, "  forbidden violated: {}", opt(self.forbidden_edges_violation_rate))?;
        write!(f, "  required present:  {}", opt(self.required_edges_compliance_rate))
    }
}

/// Identified backdoor estimand `E[outcome | do(treatment)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimand {
    pub treatment: String,
    pub outcome: String,
    pub backdoor_set: Vec<String>,
    /// False when the graph leaves no directed path from treatment to outcome.
    pub identified: bool,
}

impl fmt::Display for Estimand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.backdoor_set.is_empty() {
            write!(f, "d/d{} E[{}]", self.treatment, self.outcome)
        } else {
            write!(
                f,
                "d/d{} E[{} | {}]",
                self.treatment,
                self.outcome,
                self.backdoor_set.join(", ")
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    /// Discovery method whose graph produced the estimand.
    pub method: String,
    pub treatment: String,
    pub estimand: Estimand,
    #[serde(with = "non_finite")]
    pub estimate: f64,
    pub control_value: f64,
    pub treatment_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefutationResult {
    pub treatment: String,
    pub refuter: String,
    #[serde(with = "non_finite")]
    pub estimated_effect: f64,
    #[serde(with = "non_finite")]
    pub new_effect: f64,
    #[serde(with = "non_finite")]
    pub p_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_secs: Option<f64>,
    pub passed: bool,
}

impl RefutationResult {
    /// `passed` defaults to `p_value >= 0.05` when not given.
    pub fn new(
        treatment: impl Into<String>,
        refuter: impl Into<String>,
        estimated_effect: f64,
        new_effect: f64,
        p_value: f64,
        passed: Option<bool>,
    ) -> Self {
        Self {
            treatment: treatment.into(),
            refuter: refuter.into(),
            estimated_effect,
            new_effect,
            p_value,
            runtime_secs: None,
            passed: passed.unwrap_or(p_value >= REFUTATION_PASS_THRESHOLD),
        }
    }

    pub fn with_runtime(mut self, runtime_secs: f64) -> Self {
        self.runtime_secs = Some(runtime_secs);
        self
    }
}

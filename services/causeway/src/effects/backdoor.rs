use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::analytics::regression::{ols, RegressionError};
use crate::dataset::{Dataset, DatasetError};
use crate::graph::CausalGraph;
use crate::results::{Estimand, EstimationResult};

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("treatment '{0}' is not a column of the dataset")]
    UnknownTreatment(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("regression failed: {0}")]
    Regression(#[from] RegressionError),
}

/// Computes the effect of one treatment on the dataset target, given a graph.
pub trait Estimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(
        &self,
        method: &str,
        dataset: &Dataset,
        graph: &CausalGraph,
        treatment: &str,
    ) -> Result<EstimationResult, EstimationError>;
}

/// Backdoor adjustment by linear regression.
///
/// The adjustment set is the treatment's parents in the graph. The effect is the
/// treatment coefficient of `outcome ~ 1 + treatment + parents`, comparing a
/// treatment value of 1 against a control value of 0. When the graph has no
/// directed path from treatment to outcome the effect is zero and the estimand
/// is marked unidentified.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackdoorLinearRegression;

impl Estimator for BackdoorLinearRegression {
    fn name(&self) -> &'static str {
        "backdoor.linear_regression"
    }

    fn estimate(
        &self,
        method: &str,
        dataset: &Dataset,
        graph: &CausalGraph,
        treatment: &str,
    ) -> Result<EstimationResult, EstimationError> {
        if !dataset.has_column(treatment) {
            return Err(EstimationError::UnknownTreatment(treatment.to_string()));
        }
        let estimand = identify(dataset, graph, treatment);

        let (estimate, p_value) = if estimand.identified {
            let fit = EffectData::load(dataset, &estimand)?.fit()?;
            (fit.estimate, fit.p_value)
        } else {
            (0.0, None)
        };

        Ok(EstimationResult {
            method: method.to_string(),
            treatment: treatment.to_string(),
            estimand,
            estimate,
            control_value: 0.0,
            treatment_value: 1.0,
            p_value,
        })
    }
}

/// Backdoor estimand of `treatment` on the dataset target.
pub fn identify(dataset: &Dataset, graph: &CausalGraph, treatment: &str) -> Estimand {
    let outcome = dataset.target();
    let mut backdoor_set: Vec<String> = graph
        .parents(treatment)
        .into_iter()
        .filter(|p| *p != outcome && dataset.has_column(p))
        .map(str::to_string)
        .collect();
    backdoor_set.sort();

    Estimand {
        treatment: treatment.to_string(),
        outcome: outcome.to_string(),
        backdoor_set,
        identified: graph.has_path(treatment, outcome),
    }
}

/// Result of one linear fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearEffect {
    pub estimate: f64,
    pub p_value: Option<f64>,
}

/// Columns taking part in an estimate, restricted to complete rows.
#[derive(Debug, Clone)]
pub struct EffectData {
    pub treatment: Vec<f64>,
    pub outcome: Vec<f64>,
    pub controls: Vec<Vec<f64>>,
}

impl EffectData {
    pub fn load(dataset: &Dataset, estimand: &Estimand) -> Result<Self, DatasetError> {
        let treatment = dataset.numeric_column(&estimand.treatment)?;
        let outcome = dataset.numeric_column(&estimand.outcome)?;
        let controls = estimand
            .backdoor_set
            .iter()
            .map(|name| dataset.numeric_column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let keep: Vec<usize> = (0..treatment.len())
            .filter(|&r| {
                treatment[r].is_finite()
                    && outcome[r].is_finite()
                    && controls.iter().all(|c| c[r].is_finite())
            })
            .collect();

        Ok(Self {
            treatment,
            outcome,
            controls,
        }
        .subset(&keep))
    }

    pub fn len(&self) -> usize {
        self.treatment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.treatment.is_empty()
    }

    pub fn fit(&self) -> Result<LinearEffect, RegressionError> {
        let rows = self.len();
        let design = Array2::from_shape_fn((rows, 2 + self.controls.len()), |(r, c)| match c {
            0 => 1.0,
            1 => self.treatment[r],
            _ => self.controls[c - 2][r],
        });
        let y = Array1::from(self.outcome.clone());
        let fit = ols(&design, &y)?;
        Ok(LinearEffect {
            estimate: fit.coefficient(1).unwrap_or(0.0),
            p_value: fit.p_value(1).filter(|p| p.is_finite()),
        })
    }

    pub fn with_treatment(&self, treatment: Vec<f64>) -> Self {
        Self {
            treatment,
            ..self.clone()
        }
    }

    pub fn with_control(&self, control: Vec<f64>) -> Self {
        let mut controls = self.controls.clone();
        controls.push(control);
        Self {
            controls,
            ..self.clone()
        }
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let pick = |v: &Vec<f64>| indices.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            treatment: pick(&self.treatment),
            outcome: pick(&self.outcome),
            controls: self.controls.iter().map(pick).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureType, FeatureTypeMap};
    use polars::prelude::*;

    // C = 2A + 3B + noise, with B also driving A
    fn dataset() -> Dataset {
        let b: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64).collect();
        let a: Vec<f64> = (0..40).map(|i| b[i] * 0.5 + ((i * 3) % 5) as f64).collect();
        let c: Vec<f64> = (0..40)
            .map(|i| 2.0 * a[i] + 3.0 * b[i] + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let frame = df!("A" => a, "B" => b, "C" => c).unwrap();
        let mapping = vec![
            FeatureTypeMap::new("A", FeatureType::Continuous),
            FeatureTypeMap::new("B", FeatureType::Continuous),
        ];
        Dataset::new(frame, "C", mapping).unwrap()
    }

    #[test]
    fn test_identify_uses_parents_of_treatment() {
        let ds = dataset();
        let graph = CausalGraph::from_edges([("B", "A"), ("A", "C"), ("B", "C")]);
        let estimand = identify(&ds, &graph, "A");
        assert_eq!(estimand.backdoor_set, vec!["B".to_string()]);
        assert!(estimand.identified);
        assert_eq!(estimand.to_string(), "d/dA E[C | B]");
    }

    #[test]
    fn test_adjusted_estimate_recovers_effect() {
        let ds = dataset();
        let graph = CausalGraph::from_edges([("B", "A"), ("A", "C"), ("B", "C")]);
        let result = BackdoorLinearRegression.estimate("PC", &ds, &graph, "A").unwrap();
        assert!((result.estimate - 2.0).abs() < 0.05, "estimate {}", result.estimate);
        assert!(result.p_value.unwrap() < 0.01);
        assert_eq!(result.method, "PC");
        assert_eq!(result.treatment_value, 1.0);
        assert_eq!(result.control_value, 0.0);
    }

    #[test]
    fn test_no_path_gives_zero_effect() {
        let ds = dataset();
        let graph = CausalGraph::from_edges([("C", "A"), ("B", "C")]);
        let result = BackdoorLinearRegression.estimate("GS", &ds, &graph, "A").unwrap();
        assert!(!result.estimand.identified);
        assert_eq!(result.estimate, 0.0);
        assert!(result.p_value.is_none());
    }

    #[test]
    fn test_unknown_treatment() {
        let ds = dataset();
        let err = BackdoorLinearRegression
            .estimate("PC", &ds, &CausalGraph::new(), "Z")
            .unwrap_err();
        assert!(matches!(err, EstimationError::UnknownTreatment(_)));
    }

    #[test]
    fn test_effect_data_skips_incomplete_rows() {
        let frame = df!(
            "A" => &[Some(1.0), None, Some(3.0), Some(4.0)],
            "C" => &[Some(2.0), Some(4.0), Some(6.0), None]
        )
        .unwrap();
        let ds = Dataset::new(frame, "C", vec![FeatureTypeMap::new("A", FeatureType::Continuous)]).unwrap();
        let estimand = identify(&ds, &CausalGraph::from_edges([("A", "C")]), "A");
        let data = EffectData::load(&ds, &estimand).unwrap();
        assert_eq!(data.treatment, vec![1.0, 3.0]);
        assert_eq!(data.outcome, vec![2.0, 6.0]);
    }
}

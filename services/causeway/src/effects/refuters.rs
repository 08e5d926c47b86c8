//! Refutation tests for linear backdoor estimates.
//!
//! Every refuter re-estimates the effect on a number of perturbed copies of the
//! data and compares the original estimate against the distribution of the
//! simulated effects with a one-sided normal test.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use super::backdoor::EffectData;
use crate::analytics::regression::RegressionError;
use crate::dataset::{Dataset, DatasetError};
use crate::results::{EstimationResult, RefutationResult};
use crate::scheduler::Budget;

pub const DEFAULT_SIMULATIONS: usize = 100;
pub const DEFAULT_SUBSET_FRACTION: f64 = 0.9;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum RefutationError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("regression failed: {0}")]
    Regression(#[from] RegressionError),

    #[error("invalid refuter settings: {0}")]
    InvalidSettings(String),

    #[error("refutation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefutationMethod {
    /// Replaces the treatment by a random permutation of itself. Effect should vanish.
    PlaceboPermute,
    /// Adds an independent standard-normal confounder. Effect should not move.
    RandomCommonCause,
    /// Re-estimates on a random subset of the rows. Effect should not move.
    SubsetRemoval,
}

impl RefutationMethod {
    /// Refuters in the order they are applied.
    pub const ALL: [RefutationMethod; 3] = [
        RefutationMethod::PlaceboPermute,
        RefutationMethod::RandomCommonCause,
        RefutationMethod::SubsetRemoval,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RefutationMethod::PlaceboPermute => "PlaceboPermute",
            RefutationMethod::RandomCommonCause => "RandomCommonCause",
            RefutationMethod::SubsetRemoval => "SubsetRemoval",
        }
    }
}

impl fmt::Display for RefutationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefuterSettings {
    pub simulations: usize,
    pub subset_fraction: f64,
    pub seed: u64,
}

impl RefuterSettings {
    /// At least one simulation, and a subset fraction in `(0, 1]`.
    pub fn validate(&self) -> Result<(), RefutationError> {
        if self.simulations == 0 {
            return Err(RefutationError::InvalidSettings(
                "simulations must be at least 1".to_string(),
            ));
        }
        if !(self.subset_fraction > 0.0 && self.subset_fraction <= 1.0) {
            return Err(RefutationError::InvalidSettings(format!(
                "subset_fraction must be in (0, 1], got {}",
                self.subset_fraction
            )));
        }
        Ok(())
    }
}

impl Default for RefuterSettings {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            subset_fraction: DEFAULT_SUBSET_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl RefutationMethod {
    /// Runs this refuter against `estimate`.
    ///
    /// Checks the budget's cancellation flag between simulations; an exhausted
    /// soft limit does not interrupt a refuter that already started.
    pub fn refute(
        &self,
        dataset: &Dataset,
        estimate: &EstimationResult,
        settings: &RefuterSettings,
        budget: &Budget,
    ) -> Result<RefutationResult, RefutationError> {
        settings.validate()?;
        let started = Instant::now();

        // unidentified estimands have a fixed zero effect, nothing to perturb
        if !estimate.estimand.identified {
            let result = RefutationResult::new(&estimate.treatment, self.name(), estimate.estimate, 0.0, 1.0, None);
            return Ok(result.with_runtime(started.elapsed().as_secs_f64()));
        }

        let base = EffectData::load(dataset, &estimate.estimand)?;
        let mut rng = fastrand::Rng::with_seed(settings.seed);
        let rows = base.len();
        let kept = subset_size(rows, settings.subset_fraction);

        let mut effects = Vec::with_capacity(settings.simulations);
        for _ in 0..settings.simulations {
            if budget.token().is_cancelled() {
                return Err(RefutationError::Cancelled);
            }
            let sample = match self {
                RefutationMethod::PlaceboPermute => {
                    let mut treatment = base.treatment.clone();
                    rng.shuffle(&mut treatment);
                    base.with_treatment(treatment)
                }
                RefutationMethod::RandomCommonCause => {
                    let confounder = (0..rows).map(|_| standard_normal(&mut rng)).collect();
                    base.with_control(confounder)
                }
                RefutationMethod::SubsetRemoval => {
                    let mut rows: Vec<usize> = (0..rows).collect();
                    rng.shuffle(&mut rows);
                    rows.truncate(kept);
                    rows.sort_unstable();
                    base.subset(&rows)
                }
            };
            effects.push(sample.fit()?.estimate);
        }

        let new_effect = mean(&effects);
        let p_value = normal_test(estimate.estimate, &effects);
        debug!(
            "{} on {}: estimate {:.4}, simulated {:.4}, p {:.4}",
            self, estimate.treatment, estimate.estimate, new_effect, p_value
        );

        let result = RefutationResult::new(
            &estimate.treatment,
            self.name(),
            estimate.estimate,
            new_effect,
            p_value,
            None,
        );
        Ok(result.with_runtime(started.elapsed().as_secs_f64()))
    }
}

/// Applies the refuters in order, stopping before the next one once the budget
/// is exhausted.
pub fn refute_all(
    dataset: &Dataset,
    estimate: &EstimationResult,
    settings: &RefuterSettings,
    budget: &Budget,
) -> Result<Vec<RefutationResult>, RefutationError> {
    let mut results = Vec::with_capacity(RefutationMethod::ALL.len());
    for method in RefutationMethod::ALL {
        if budget.is_exhausted() {
            debug!(
                "Refutation budget of {} spent after {} refuters",
                estimate.treatment,
                results.len()
            );
            break;
        }
        results.push(method.refute(dataset, estimate, settings, budget)?);
    }
    Ok(results)
}

/// Rows kept by subset removal: `fraction * rows`, rounded, at least one.
fn subset_size(rows: usize, fraction: f64) -> usize {
    let fraction = fraction.clamp(0.0, 1.0);
    ((rows as f64 * fraction).round() as usize).clamp(1.min(rows), rows)
}

fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1]
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// One-sided p-value of `estimate` under a normal fitted to `simulations`.
///
/// With zero spread the p-value is 1 when the estimate equals the simulated
/// mean and 0 otherwise.
pub fn normal_test(estimate: f64, simulations: &[f64]) -> f64 {
    let m = mean(simulations);
    if !m.is_finite() || !estimate.is_finite() {
        return f64::NAN;
    }
    let variance = simulations.iter().map(|v| (v - m).powi(2)).sum::<f64>() / simulations.len() as f64;
    let std = variance.sqrt();
    if std <= f64::EPSILON * m.abs().max(1.0) {
        return if (estimate - m).abs() <= 1e-9 * m.abs().max(1.0) { 1.0 } else { 0.0 };
    }

    let z = (estimate - m) / std;
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return f64::NAN;
    };
    if z > 0.0 {
        1.0 - normal.cdf(z)
    } else {
        normal.cdf(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureType, FeatureTypeMap};
    use crate::effects::backdoor::{BackdoorLinearRegression, Estimator};
    use crate::graph::CausalGraph;
    use crate::scheduler::CancellationToken;
    use polars::prelude::*;

    fn estimate() -> (Dataset, EstimationResult) {
        let a: Vec<f64> = (0..60).map(|i| ((i * 13) % 17) as f64).collect();
        let c: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, v)| 3.0 * v + ((i * 5) % 7) as f64 * 0.2)
            .collect();
        let frame = df!("A" => a, "C" => c).unwrap();
        let ds = Dataset::new(frame, "C", vec![FeatureTypeMap::new("A", FeatureType::Continuous)]).unwrap();
        let graph = CausalGraph::from_edges([("A", "C")]);
        let result = BackdoorLinearRegression.estimate("PC", &ds, &graph, "A").unwrap();
        (ds, result)
    }

    fn settings() -> RefuterSettings {
        RefuterSettings {
            simulations: 30,
            ..RefuterSettings::default()
        }
    }

    #[test]
    fn test_refuter_names_in_order() {
        let names: Vec<&str> = RefutationMethod::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["PlaceboPermute", "RandomCommonCause", "SubsetRemoval"]);
    }

    #[test]
    fn test_placebo_effect_vanishes() {
        let (ds, est) = estimate();
        let r = RefutationMethod::PlaceboPermute
            .refute(&ds, &est, &settings(), &Budget::unlimited())
            .unwrap();
        assert_eq!(r.refuter, "PlaceboPermute");
        assert!((r.estimated_effect - 3.0).abs() < 0.1);
        assert!(r.new_effect.abs() < 0.5, "placebo effect {}", r.new_effect);
        assert!(r.p_value < 0.05);
        assert!(!r.passed);
        assert!(r.runtime_secs.is_some());
    }

    #[test]
    fn test_stable_refuters_keep_effect() {
        let (ds, est) = estimate();
        for method in [RefutationMethod::RandomCommonCause, RefutationMethod::SubsetRemoval] {
            let r = method.refute(&ds, &est, &settings(), &Budget::unlimited()).unwrap();
            assert!((r.new_effect - r.estimated_effect).abs() < 0.05, "{} moved the effect", method);
        }
    }

    #[test]
    fn test_refutation_is_seeded() {
        let (ds, est) = estimate();
        let first = RefutationMethod::PlaceboPermute
            .refute(&ds, &est, &settings(), &Budget::unlimited())
            .unwrap();
        let second = RefutationMethod::PlaceboPermute
            .refute(&ds, &est, &settings(), &Budget::unlimited())
            .unwrap();
        assert_eq!(first.new_effect, second.new_effect);
    }

    #[test]
    fn test_cancelled_refutation() {
        let (ds, est) = estimate();
        let token = CancellationToken::new();
        token.cancel();
        let budget = Budget::new(None, token);
        let err = RefutationMethod::SubsetRemoval
            .refute(&ds, &est, &settings(), &budget)
            .unwrap_err();
        assert!(matches!(err, RefutationError::Cancelled));
    }

    #[test]
    fn test_refute_all_stops_on_spent_budget() {
        let (ds, est) = estimate();
        let all = refute_all(&ds, &est, &settings(), &Budget::unlimited()).unwrap();
        assert_eq!(all.len(), 3);

        let spent = Budget::new(Some(std::time::Duration::ZERO), CancellationToken::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(refute_all(&ds, &est, &settings(), &spent).unwrap().is_empty());
    }

    #[test]
    fn test_zero_simulations_are_rejected() {
        let (ds, est) = estimate();
        let empty = RefuterSettings {
            simulations: 0,
            ..settings()
        };
        let err = RefutationMethod::PlaceboPermute
            .refute(&ds, &est, &empty, &Budget::unlimited())
            .unwrap_err();
        assert!(matches!(err, RefutationError::InvalidSettings(_)));

        let no_rows = RefuterSettings {
            subset_fraction: 0.0,
            ..settings()
        };
        assert!(no_rows.validate().is_err());
        assert!(settings().validate().is_ok());
    }

    #[test]
    fn test_normal_test() {
        assert_eq!(normal_test(1.0, &[1.0, 1.0, 1.0]), 1.0);
        assert_eq!(normal_test(2.0, &[1.0, 1.0, 1.0]), 0.0);
        // estimate one standard deviation above the mean
        let p = normal_test(2.0, &[0.0, 2.0]);
        assert!((p - 0.158655).abs() < 1e-4);
        assert!((normal_test(0.0, &[0.0, 2.0]) - 0.158655).abs() < 1e-4);
    }

    #[test]
    fn test_subset_size() {
        assert_eq!(subset_size(10, 0.9), 9);
        assert_eq!(subset_size(3, 0.1), 1);
        assert_eq!(subset_size(0, 0.9), 0);
    }
}

//! Distributional checks that gate which discovery methods may run.

use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::regression::fit_simple;
use crate::dataset::Dataset;

pub const DEFAULT_NORMALITY_THRESHOLD: f64 = 0.05;
pub const DEFAULT_LINEARITY_THRESHOLD: f64 = 0.05;

/// Smallest sample the skewness test is defined for.
pub const MIN_NORMALITY_SAMPLES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalityTest {
    pub statistic: f64,
    pub p_value: f64,
}

impl NormalityTest {
    fn undefined() -> Self {
        Self {
            statistic: f64::NAN,
            p_value: f64::NAN,
        }
    }
}

/// D'Agostino and Pearson's omnibus test: `K² = Z(skew)² + Z(kurtosis)²`,
/// compared against a chi-squared distribution with two degrees of freedom.
///
/// Samples that are too small, constant, or hold non-finite values yield `NaN`,
/// which never passes a threshold.
pub fn normality_test(values: &[f64]) -> NormalityTest {
    let n = values.len();
    if n < MIN_NORMALITY_SAMPLES || values.iter().any(|v| !v.is_finite()) {
        return NormalityTest::undefined();
    }

    let n_f = n as f64;
    let mean = values.iter().sum::<f64>() / n_f;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n_f;
    if m2 <= 0.0 {
        return NormalityTest::undefined();
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n_f;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n_f;

    let z_skew = skew_z(m3 / m2.powf(1.5), n_f);
    let z_kurt = kurtosis_z(m4 / (m2 * m2), n_f);
    let statistic = z_skew * z_skew + z_kurt * z_kurt;

    let p_value = match ChiSquared::new(2.0) {
        Ok(chi2) if statistic.is_finite() => chi2.sf(statistic),
        _ => f64::NAN,
    };

    NormalityTest { statistic, p_value }
}

fn skew_z(b2: f64, n: f64) -> f64 {
    let y = b2 * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    let y = if y == 0.0 { 1.0 } else { y };
    delta * (y / alpha + ((y / alpha).powi(2) + 1.0).sqrt()).ln()
}

fn kurtosis_z(b2: f64, n: f64) -> f64 {
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (b2 - expected) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / sqrt_beta1.powi(2)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// Every Continuous or Discrete feature passes the normality test at `threshold`.
pub fn is_normal(dataset: &Dataset, threshold: f64) -> bool {
    dataset
        .feature_mapping()
        .iter()
        .filter(|m| m.kind.is_normality_checkable())
        .all(|m| match dataset.numeric_column(&m.feature) {
            Ok(values) => normality_test(&values).p_value >= threshold,
            Err(_) => false,
        })
}

/// Fits `y ~ x` and accepts the pair when the signed mean residual is at most
/// `threshold`.
pub fn check_linearity(x: &[f64], y: &[f64], threshold: f64) -> bool {
    let n = x.len().min(y.len());
    if n == 0 {
        return false;
    }
    let fit = fit_simple(x, y);
    let mean_residual = x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(&xi, &yi)| yi - fit.predict(xi))
        .sum::<f64>()
        / n as f64;
    mean_residual <= threshold
}

/// Every unordered pair drawn from the mapped features plus the target is linear.
pub fn is_linear(dataset: &Dataset) -> bool {
    let mut names: Vec<&str> = dataset.feature_names();
    names.push(dataset.target());

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        match dataset.numeric_column(name) {
            Ok(values) => columns.push(values),
            Err(_) => return false,
        }
    }

    for i in 0..columns.len() {
        for j in (i + 1)..columns.len() {
            if !check_linearity(&columns[i], &columns[j], DEFAULT_LINEARITY_THRESHOLD) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureType, FeatureTypeMap};
    use polars::prelude::*;

    // Standard normal quantiles at (i - 0.5) / 20.
    const NORMAL_SCORES: [f64; 20] = [
        -1.9600, -1.4395, -1.1503, -0.9346, -0.7554, -0.5978, -0.4538, -0.3186, -0.1891, -0.0627,
        0.0627, 0.1891, 0.3186, 0.4538, 0.5978, 0.7554, 0.9346, 1.1503, 1.4395, 1.9600,
    ];

    #[test]
    fn test_normal_scores_pass() {
        let result = normality_test(&NORMAL_SCORES);
        assert!(result.p_value > 0.05, "p = {}", result.p_value);
    }

    #[test]
    fn test_skewed_sample_fails() {
        let values: Vec<f64> = (0..30).map(|i| (i as f64 / 3.0).exp()).collect();
        let result = normality_test(&values);
        assert!(result.p_value < 0.05, "p = {}", result.p_value);
    }

    #[test]
    fn test_small_or_constant_samples_are_undefined() {
        assert!(normality_test(&[1.0, 2.0, 3.0]).p_value.is_nan());
        assert!(normality_test(&[4.0; 12]).p_value.is_nan());
        let mut with_nan = NORMAL_SCORES.to_vec();
        with_nan[3] = f64::NAN;
        assert!(normality_test(&with_nan).p_value.is_nan());
    }

    #[test]
    fn test_check_linearity_uses_signed_mean_residual() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        assert!(check_linearity(&x, &y, 0.05));
        assert!(!check_linearity(&[], &[], 0.05));
    }

    #[test]
    fn test_is_normal_ignores_categorical_features() {
        let skewed: Vec<f64> = (0..20).map(|i| (i as f64 / 2.0).exp()).collect();
        let frame = df!(
            "x" => NORMAL_SCORES.to_vec(),
            "c" => skewed,
            "y" => NORMAL_SCORES.iter().rev().copied().collect::<Vec<f64>>()
        )
        .unwrap();
        let dataset = Dataset::new(
            frame.clone(),
            "y",
            vec![
                FeatureTypeMap::new("x", FeatureType::Continuous),
                FeatureTypeMap::new("c", FeatureType::Categorical),
            ],
        )
        .unwrap();
        assert!(is_normal(&dataset, DEFAULT_NORMALITY_THRESHOLD));

        let dataset = Dataset::new(
            frame,
            "y",
            vec![FeatureTypeMap::new("c", FeatureType::Discrete)],
        )
        .unwrap();
        assert!(!is_normal(&dataset, DEFAULT_NORMALITY_THRESHOLD));
        assert!(is_linear(&dataset));
    }
}

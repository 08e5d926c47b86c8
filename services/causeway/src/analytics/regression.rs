//! Least-squares fits used by the linearity check and the backdoor estimator.

use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegressionError {
    #[error("design has {rows} rows but response has {response}")]
    ShapeMismatch { rows: usize, response: usize },

    #[error("not enough observations: {observations} rows for {parameters} parameters")]
    Underdetermined { observations: usize, parameters: usize },

    #[error("design matrix is singular")]
    Singular,
}

/// `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleFit {
    pub intercept: f64,
    pub slope: f64,
}

impl SimpleFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares with an intercept on one regressor.
///
/// A constant `x` yields a flat line through the mean of `y`.
pub fn fit_simple(x: &[f64], y: &[f64]) -> SimpleFit {
    let n = x.len().min(y.len());
    if n == 0 {
        return SimpleFit {
            intercept: f64::NAN,
            slope: f64::NAN,
        };
    }
    let n_f = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / n_f;
    let mean_y = y[..n].iter().sum::<f64>() / n_f;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (xi, yi) in x[..n].iter().zip(&y[..n]) {
        sxy += (xi - mean_x) * (yi - mean_y);
        sxx += (xi - mean_x).powi(2);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    SimpleFit {
        intercept: mean_y - slope * mean_x,
        slope,
    }
}

/// Pearson correlation; `NaN` when either side is constant or empty.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return f64::NAN;
    }
    let n_f = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / n_f;
    let mean_y = y[..n].iter().sum::<f64>() / n_f;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x[..n].iter().zip(&y[..n]) {
        sxy += (xi - mean_x) * (yi - mean_y);
        sxx += (xi - mean_x).powi(2);
        syy += (yi - mean_y).powi(2);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    pub std_errors: Array1<f64>,
    /// Two-sided p-value of `coefficient == 0` for each column.
    pub p_values: Array1<f64>,
    pub residual_dof: usize,
}

impl OlsFit {
    pub fn coefficient(&self, column: usize) -> Option<f64> {
        self.coefficients.get(column).copied()
    }

    pub fn p_value(&self, column: usize) -> Option<f64> {
        self.p_values.get(column).copied()
    }
}

/// Fits `y = X b` by least squares. `design` must already carry an intercept
/// column if one is wanted.
pub fn ols(design: &Array2<f64>, y: &Array1<f64>) -> Result<OlsFit, RegressionError> {
    let (rows, params) = design.dim();
    if rows != y.len() {
        return Err(RegressionError::ShapeMismatch {
            rows,
            response: y.len(),
        });
    }
    if rows <= params {
        return Err(RegressionError::Underdetermined {
            observations: rows,
            parameters: params,
        });
    }

    let xtx = design.t().dot(design);
    let xtx_inv = invert(&xtx).ok_or(RegressionError::Singular)?;
    let coefficients = xtx_inv.dot(&design.t().dot(y));

    let residuals = y - &design.dot(&coefficients);
    let residual_dof = rows - params;
    let sigma2 = residuals.dot(&residuals) / residual_dof as f64;

    let std_errors: Array1<f64> = xtx_inv.diag().mapv(|v| (v.max(0.0) * sigma2).sqrt());
    let t_dist = StudentsT::new(0.0, 1.0, residual_dof as f64).ok();
    let p_values = coefficients
        .iter()
        .zip(std_errors.iter())
        .map(|(&b, &se)| match (&t_dist, se > 0.0) {
            (Some(t), true) => 2.0 * (1.0 - t.cdf((b / se).abs())),
            (_, false) if b != 0.0 => 0.0,
            _ => 1.0,
        })
        .collect();

    Ok(OlsFit {
        coefficients,
        std_errors,
        p_values,
        residual_dof,
    })
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return None;
    }
    let scale = matrix.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);
    let eps = 1e-12 * scale;

    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[[i, col]]
                .abs()
                .partial_cmp(&a[[j, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if !a[[pivot, col]].is_finite() || a[[pivot, col]].abs() <= eps {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
        }

        let p = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= p;
            inv[[col, k]] /= p;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_simple_recovers_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = fit_simple(&x, &y);
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.predict(10.0) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_simple_constant_regressor() {
        let fit = fit_simple(&[2.0, 2.0, 2.0], &[1.0, 2.0, 6.0]);
        assert_eq!(fit.slope, 0.0);
        assert!((fit.intercept - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation() {
        assert!((correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(correlation(&[1.0, 1.0], &[2.0, 3.0]).is_nan());
    }

    #[test]
    fn test_ols_two_regressors() {
        // y = 1 + 2 a - b, with a small perturbation so the residual variance is nonzero
        let a = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let b = [1.0, 0.0, 2.0, 1.0, 3.0, 2.0, 4.0, 3.0];
        let noise = [0.01, -0.01, 0.02, -0.02, 0.01, -0.01, 0.0, 0.0];
        let mut design = Array2::<f64>::ones((8, 3));
        let mut y = Array1::<f64>::zeros(8);
        for i in 0..8 {
            design[[i, 1]] = a[i];
            design[[i, 2]] = b[i];
            y[i] = 1.0 + 2.0 * a[i] - b[i] + noise[i];
        }

        let fit = ols(&design, &y).unwrap();
        assert!((fit.coefficient(1).unwrap() - 2.0).abs() < 0.05);
        assert!((fit.coefficient(2).unwrap() + 1.0).abs() < 0.05);
        assert!(fit.p_value(1).unwrap() < 0.001);
        assert_eq!(fit.residual_dof, 5);
    }

    #[test]
    fn test_ols_rejects_singular_design() {
        let design = array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]];
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(ols(&design, &y).unwrap_err(), RegressionError::Singular);
    }

    #[test]
    fn test_ols_rejects_underdetermined() {
        let design = array![[1.0, 0.0], [1.0, 1.0]];
        let y = array![1.0, 2.0];
        assert!(matches!(
            ols(&design, &y),
            Err(RegressionError::Underdetermined { .. })
        ));
    }
}

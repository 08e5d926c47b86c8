pub mod distribution;
pub mod metrics;
pub mod regression;

pub use distribution::{check_linearity, is_linear, is_normal, normality_test, NormalityTest};
pub use metrics::{auc_pr, structural_hamming_distance, structural_intervention_distance};
pub use regression::{correlation, fit_simple, ols, OlsFit, RegressionError, SimpleFit};

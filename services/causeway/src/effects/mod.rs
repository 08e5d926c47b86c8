pub mod backdoor;
pub mod refuters;

pub use backdoor::{identify, BackdoorLinearRegression, EffectData, EstimationError, Estimator, LinearEffect};
pub use refuters::{normal_test, refute_all, RefutationError, RefutationMethod, RefuterSettings};

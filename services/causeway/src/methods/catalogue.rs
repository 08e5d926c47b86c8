use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::external::ExternalDiscovery;
use super::mock::MockDiscovery;
use super::traits::{AlgorithmError, DiscoveryAlgorithm};
use crate::analytics::distribution::{is_linear, is_normal, DEFAULT_NORMALITY_THRESHOLD};
use crate::dataset::{Dataset, FeatureType};
use crate::graph::CausalGraph;

use FeatureType::{Categorical, Continuous, Discrete, Ignorable};

/// Static description of a discovery method's assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub accepted_types: &'static [FeatureType],
    pub gaussian_assumption: bool,
    pub linearity_assumption: bool,
}

const ALL_TYPES: &[FeatureType] = &[Categorical, Discrete, Continuous, Ignorable];

/// Built-in methods, in registry order.
pub const CATALOGUE: [MethodSpec; 12] = [
    MethodSpec {
        name: "PC",
        accepted_types: &[Continuous, Discrete],
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "GS",
        accepted_types: ALL_TYPES,
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "GES",
        accepted_types: &[Continuous, Categorical],
        gaussian_assumption: true,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "GIES",
        accepted_types: &[Continuous, Categorical],
        gaussian_assumption: true,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "CAM",
        accepted_types: &[Continuous],
        gaussian_assumption: true,
        linearity_assumption: true,
    },
    MethodSpec {
        name: "CCDR",
        accepted_types: &[Continuous],
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "IAMB",
        accepted_types: ALL_TYPES,
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "LINGAM",
        accepted_types: &[Continuous],
        gaussian_assumption: true,
        linearity_assumption: true,
    },
    MethodSpec {
        name: "SAM",
        accepted_types: &[Continuous],
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "BES",
        accepted_types: &[Continuous],
        gaussian_assumption: false,
        linearity_assumption: true,
    },
    MethodSpec {
        name: "GRASP",
        accepted_types: &[Continuous],
        gaussian_assumption: false,
        linearity_assumption: false,
    },
    MethodSpec {
        name: "CGNN",
        accepted_types: &[Continuous],
        gaussian_assumption: false,
        linearity_assumption: false,
    },
];

/// A registered method: its assumptions plus the algorithm bound to it.
#[derive(Clone)]
pub struct DiscoveryMethod {
    name: String,
    accepted_types: Vec<FeatureType>,
    gaussian_assumption: bool,
    linearity_assumption: bool,
    algorithm: Arc<dyn DiscoveryAlgorithm>,
}

impl DiscoveryMethod {
    pub fn new(
        name: impl Into<String>,
        accepted_types: &[FeatureType],
        gaussian_assumption: bool,
        linearity_assumption: bool,
        algorithm: Arc<dyn DiscoveryAlgorithm>,
    ) -> Self {
        Self {
            name: name.into(),
            accepted_types: accepted_types.to_vec(),
            gaussian_assumption,
            linearity_assumption,
            algorithm,
        }
    }

    pub fn from_spec(spec: &MethodSpec, algorithm: Arc<dyn DiscoveryAlgorithm>) -> Self {
        Self::new(
            spec.name,
            spec.accepted_types,
            spec.gaussian_assumption,
            spec.linearity_assumption,
            algorithm,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepted_types(&self) -> &[FeatureType] {
        &self.accepted_types
    }

    pub fn assumes_gaussian(&self) -> bool {
        self.gaussian_assumption
    }

    pub fn assumes_linearity(&self) -> bool {
        self.linearity_assumption
    }

    /// Type check, then normality, then linearity; stops at the first failure.
    pub fn is_applicable(&self, dataset: &Dataset) -> bool {
        if !dataset
            .feature_mapping()
            .iter()
            .all(|m| self.accepted_types.contains(&m.kind))
        {
            debug!("{} rejected: unsupported feature types", self.name);
            return false;
        }
        if self.gaussian_assumption && !is_normal(dataset, DEFAULT_NORMALITY_THRESHOLD) {
            debug!("{} rejected: features are not normally distributed", self.name);
            return false;
        }
        if self.linearity_assumption && !is_linear(dataset) {
            debug!("{} rejected: feature pairs are not linear", self.name);
            return false;
        }
        true
    }

    pub async fn infer(&self, dataset: &Dataset) -> Result<CausalGraph, AlgorithmError> {
        self.algorithm.infer(dataset).await
    }
}

impl fmt::Debug for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryMethod")
            .field("name", &self.name)
            .field("accepted_types", &self.accepted_types)
            .field("gaussian_assumption", &self.gaussian_assumption)
            .field("linearity_assumption", &self.linearity_assumption)
            .finish()
    }
}

/// Ordered set of discovery methods.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: Vec<DiscoveryMethod>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue with every method bound through `bind`.
    pub fn builtin<F>(bind: F) -> Self
    where
        F: Fn(&MethodSpec) -> Arc<dyn DiscoveryAlgorithm>,
    {
        Self {
            methods: CATALOGUE
                .iter()
                .map(|spec| DiscoveryMethod::from_spec(spec, bind(spec)))
                .collect(),
        }
    }

    /// The built-in catalogue handing every method to an external worker process.
    pub fn external(program: &str, args: &[String]) -> Self {
        Self::builtin(|spec| Arc::new(ExternalDiscovery::new(spec.name, program, args.to_vec())))
    }

    /// The built-in catalogue backed by [`MockDiscovery`].
    pub fn mock(threshold: f64) -> Self {
        Self::builtin(|_| Arc::new(MockDiscovery::new(threshold)))
    }

    /// Adds a method, replacing any registered under the same name in place.
    pub fn register(mut self, method: DiscoveryMethod) -> Self {
        match self.methods.iter().position(|m| m.name == method.name) {
            Some(i) => self.methods[i] = method,
            None => self.methods.push(method),
        }
        self
    }

    pub fn methods(&self) -> &[DiscoveryMethod] {
        &self.methods
    }

    pub fn get(&self, name: &str) -> Option<&DiscoveryMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Methods whose assumptions hold for `dataset`, in registry order.
    pub fn applicable_methods(&self, dataset: &Dataset) -> Vec<&DiscoveryMethod> {
        self.methods.iter().filter(|m| m.is_applicable(dataset)).collect()
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::effects::RefuterSettings;
use crate::methods::MethodRegistry;
use crate::stages::{DiscoveryOptions, EstimationOptions, RefutationOptions};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub refutation: RefutationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    /// `0` means one worker per available CPU.
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_seconds")]
    pub max_seconds_model: u64,
    #[serde(default = "default_true")]
    pub orient_toward_target: bool,
    /// Use the correlation stand-in instead of the worker process.
    #[serde(default)]
    pub mock: bool,
    #[serde(default = "default_mock_threshold")]
    pub mock_threshold: f64,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimationConfig {
    #[serde(default = "default_estimation_seconds")]
    pub max_seconds_model: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefutationConfig {
    #[serde(default = "default_refutation_global_seconds")]
    pub max_seconds_global: u64,
    #[serde(default = "default_refutation_model_seconds")]
    pub max_seconds_model: u64,
    #[serde(default = "default_simulations")]
    pub simulations: usize,
    #[serde(default = "default_subset_fraction")]
    pub subset_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config TOML")?;
        config
            .refuter_settings()
            .validate()
            .context("Invalid [refutation] section")?;
        Ok(config)
    }

    /// The method registry this configuration asks for.
    pub fn registry(&self) -> MethodRegistry {
        if self.discovery.mock {
            MethodRegistry::mock(self.discovery.mock_threshold)
        } else {
            MethodRegistry::external(&self.discovery.worker.program, &self.discovery.worker.args)
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            timeout: Duration::from_secs(self.discovery.max_seconds_model),
            worker_count: self.orchestration.max_workers,
            orient_toward_target: self.discovery.orient_toward_target,
            keepalive: self.keepalive(),
            events: None,
        }
    }

    pub fn estimation_options(&self) -> EstimationOptions {
        EstimationOptions {
            budget: Duration::from_secs(self.estimation.max_seconds_model),
            grace: Duration::from_secs(self.orchestration.grace_secs),
            worker_count: self.orchestration.max_workers,
            keepalive: self.keepalive(),
            events: None,
        }
    }

    pub fn refutation_options(&self) -> RefutationOptions {
        RefutationOptions {
            global_budget: Duration::from_secs(self.refutation.max_seconds_global),
            model_budget: Duration::from_secs(self.refutation.max_seconds_model),
            settings: self.refuter_settings(),
            worker_count: self.orchestration.max_workers,
            keepalive: self.keepalive(),
            events: None,
        }
    }

    fn refuter_settings(&self) -> RefuterSettings {
        RefuterSettings {
            simulations: self.refutation.simulations,
            subset_fraction: self.refutation.subset_fraction,
            seed: self.refutation.seed,
        }
    }

    fn keepalive(&self) -> Duration {
        Duration::from_secs(self.orchestration.keepalive_secs.max(1))
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            keepalive_secs: default_keepalive_secs(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_seconds_model: default_discovery_seconds(),
            orient_toward_target: true,
            mock: false,
            mock_threshold: default_mock_threshold(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            args: Vec::new(),
        }
    }
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            max_seconds_model: default_estimation_seconds(),
        }
    }
}

impl Default for RefutationConfig {
    fn default() -> Self {
        Self {
            max_seconds_global: default_refutation_global_seconds(),
            max_seconds_model: default_refutation_model_seconds(),
            simulations: default_simulations(),
            subset_fraction: default_subset_fraction(),
            seed: default_seed(),
        }
    }
}

fn default_keepalive_secs() -> u64 {
    10
}

fn default_grace_secs() -> u64 {
    5
}

fn default_discovery_seconds() -> u64 {
    90
}

fn default_mock_threshold() -> f64 {
    0.3
}

fn default_worker_program() -> String {
    "causeway-discovery-worker".to_string()
}

fn default_estimation_seconds() -> u64 {
    360
}

fn default_refutation_global_seconds() -> u64 {
    180
}

fn default_refutation_model_seconds() -> u64 {
    25
}

fn default_simulations() -> usize {
    100
}

fn default_subset_fraction() -> f64 {
    0.9
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load("../../config/causeway.toml").unwrap();
        assert_eq!(config.discovery.max_seconds_model, 90);
        assert_eq!(config.refutation.max_seconds_global, 180);
        assert!(!config.discovery.worker.program.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let toml_str = r#"
[orchestration]
max_workers = 4
[discovery]
mock = true
[refutation]
simulations = 20
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestration.keepalive_secs, 10);
        assert_eq!(config.estimation.max_seconds_model, 360);
        assert_eq!(config.refutation.max_seconds_model, 25);
        assert!(config.discovery.orient_toward_target);

        let estimation = config.estimation_options();
        assert_eq!(estimation.budget, Duration::from_secs(360));
        assert_eq!(estimation.grace, Duration::from_secs(5));
        assert_eq!(estimation.worker_count, 4);

        let refutation = config.refutation_options();
        assert_eq!(refutation.settings.simulations, 20);
        assert_eq!(refutation.settings.subset_fraction, 0.9);

        assert_eq!(config.registry().len(), 12);
    }

    #[test]
    fn test_config_rejects_zero_simulations() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("causeway.toml");
        std::fs::write(&path, "[refutation]\nsimulations = 0\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("simulations must be at least 1"));
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.discovery_options().timeout, Duration::from_secs(90));
        assert!(!config.discovery.mock);
    }
}

//! Workflow agent configuration.
//!
//! Settings can be built in code, loaded from a YAML file, or read from
//! `PAPER_FORGE_*` environment variables. All three paths end in
//! [`AgentConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pipeline::PipelineConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration for a [`WorkflowAgent`](super::WorkflowAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of tasks to run concurrently per pipeline.
    pub max_workers: usize,
    /// Accepted and passed through; failed tasks are not retried.
    pub retry_attempts: u32,
    /// Seconds the scheduler waits for any single in-flight task.
    pub timeout_secs: u64,
    /// Whether quality control drops records whose stable key was already seen.
    pub enable_deduplication: bool,
    /// Completeness score used by `WorkflowAgent::threshold_filter`.
    pub quality_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry_attempts: 3,
            timeout_secs: 300,
            enable_deduplication: true,
            quality_threshold: 0.5,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PAPER_FORGE_MAX_WORKERS`: Maximum concurrent tasks (default: 4)
    /// - `PAPER_FORGE_RETRY_ATTEMPTS`: Retry attempts (default: 3)
    /// - `PAPER_FORGE_TIMEOUT_SECS`: Result wait timeout in seconds (default: 300)
    /// - `PAPER_FORGE_ENABLE_DEDUP`: Enable deduplication (default: true)
    /// - `PAPER_FORGE_QUALITY_THRESHOLD`: Completeness threshold (default: 0.5)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PAPER_FORGE_MAX_WORKERS") {
            config.max_workers = parse_env_value(&val, "PAPER_FORGE_MAX_WORKERS")?;
        }

        if let Ok(val) = std::env::var("PAPER_FORGE_RETRY_ATTEMPTS") {
            config.retry_attempts = parse_env_value(&val, "PAPER_FORGE_RETRY_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("PAPER_FORGE_TIMEOUT_SECS") {
            config.timeout_secs = parse_env_value(&val, "PAPER_FORGE_TIMEOUT_SECS")?;
        }

        if let Ok(val) = std::env::var("PAPER_FORGE_ENABLE_DEDUP") {
            config.enable_deduplication = parse_env_bool(&val, "PAPER_FORGE_ENABLE_DEDUP")?;
        }

        if let Ok(val) = std::env::var("PAPER_FORGE_QUALITY_THRESHOLD") {
            config.quality_threshold = parse_env_value(&val, "PAPER_FORGE_QUALITY_THRESHOLD")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file. Missing keys take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::ValidationFailed(
                "quality_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Scheduler settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_max_workers(self.max_workers)
            .with_retry_attempts(self.retry_attempts)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.enable_deduplication = enabled;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.enable_deduplication);
        assert!((config.quality_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AgentConfig::new()
            .with_max_workers(8)
            .with_retry_attempts(0)
            .with_timeout_secs(30)
            .with_deduplication(false)
            .with_quality_threshold(0.75);

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.retry_attempts, 0);
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.enable_deduplication);
        assert!((config.quality_threshold - 0.75).abs() < f64::EPSILON);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.max_workers, 8);
        assert_eq!(pipeline.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validation_invalid_workers() {
        let result = AgentConfig::default().with_max_workers(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_workers"));
    }

    #[test]
    fn test_validation_invalid_timeout() {
        let result = AgentConfig::default().with_timeout_secs(0).validate();
        assert!(result.unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let result = AgentConfig::default().with_quality_threshold(1.5).validate();
        assert!(result.unwrap_err().to_string().contains("quality_threshold"));
    }

    #[test]
    fn test_yaml_partial_config_uses_defaults() {
        let config = AgentConfig::from_yaml_str("max_workers: 2\nenable_deduplication: false\n")
            .expect("valid yaml");
        assert_eq!(config.max_workers, 2);
        assert!(!config.enable_deduplication);
        assert_eq!(config.timeout_secs, 300);
    }

    #[test]
    fn test_yaml_invalid_values_rejected() {
        assert!(matches!(
            AgentConfig::from_yaml_str("max_workers: 0\n"),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert!(matches!(
            AgentConfig::from_yaml_str("max_workers: [1, 2]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "quality_threshold: 0.9\n").expect("write");
        let config = AgentConfig::from_yaml_file(&path).expect("load");
        assert!((config.quality_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_env_helpers() {
        assert_eq!(parse_env_value::<usize>(" 8 ", "K").expect("number"), 8);
        assert!(parse_env_value::<usize>("eight", "K").is_err());
        assert!(parse_env_bool("YES", "K").expect("bool"));
        assert!(!parse_env_bool("off", "K").expect("bool"));
        assert!(parse_env_bool("maybe", "K").is_err());
    }
}

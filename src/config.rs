//! Configuration management for Galvani
//!
//! This module handles loading, validation, and management of the crate
//! configuration from YAML files.

use crate::error::{GalvaniError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Battery pool status supervision configuration
    pub pool: PoolConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Battery pool status supervision parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum time in seconds since a component's last telemetry sample
    /// before that component is considered stale
    pub max_data_age_sec: f64,

    /// Time in seconds an externally asserted success/failure status stays
    /// authoritative over automatic detection
    pub max_blocking_duration_sec: f64,

    /// When a dispatch outcome is reported, also distrust automatic status
    /// for every battery NOT named in that report, for the blocking
    /// duration. Batteries with their own unexpired assertion keep it.
    /// Disable to let assertions affect only the named batteries.
    #[serde(default = "default_true")]
    pub suppress_unlisted_on_override: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory for rotated logs)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_data_age_sec: 5.0,
            max_blocking_duration_sec: 30.0,
            suppress_unlisted_on_override: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/galvani/galvani.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("GALVANI_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "galvani_config.yaml",
            "/data/galvani_config.yaml",
            "/etc/galvani/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.pool.max_data_age_sec.is_finite() || self.pool.max_data_age_sec <= 0.0 {
            return Err(GalvaniError::validation(
                "pool.max_data_age_sec",
                "Must be positive",
            ));
        }

        if !self.pool.max_blocking_duration_sec.is_finite()
            || self.pool.max_blocking_duration_sec <= 0.0
        {
            return Err(GalvaniError::validation(
                "pool.max_blocking_duration_sec",
                "Must be positive",
            ));
        }

        if self.logging.file.is_empty() {
            return Err(GalvaniError::validation(
                "logging.file",
                "Log file path cannot be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.pool.max_data_age_sec - 5.0).abs() < f64::EPSILON);
        assert!((config.pool.max_blocking_duration_sec - 30.0).abs() < f64::EPSILON);
        assert!(config.pool.suppress_unlisted_on_override);
        assert_eq!(config.logging.level, "INFO");
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.pool.max_data_age_sec = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.max_blocking_duration_sec = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.file = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(
            (config.pool.max_data_age_sec - deserialized.pool.max_data_age_sec).abs()
                < f64::EPSILON
        );
        assert_eq!(
            config.pool.suppress_unlisted_on_override,
            deserialized.pool.suppress_unlisted_on_override
        );
    }

    #[test]
    fn test_suppression_flag_defaults_on_when_missing() {
        let yaml = "pool:\n  max_data_age_sec: 5.0\n  max_blocking_duration_sec: 30.0\nlogging:\n  level: INFO\n  file: /tmp/galvani.log\n  backup_count: 3\n  console_output: true\n  json_format: false\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.pool.suppress_unlisted_on_override);
    }
}

//! Simulator configuration.
//!
//! Supplied as a JSON file (`--config`) and overridden by command-line
//! flags. Every field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults {
    /// Ticks between an I/O request reaching a device and its completion.
    pub const DEVICE_DELAY: u32 = 10;

    /// Global tick budget guarding against runaway programs.
    pub const MAX_TICKS: u64 = 1024 * 1024;

    pub const LOG_PATH: &str = "rmmix.log";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default = "SimConfig::default_device_delay")]
    pub device_delay: u32,

    #[serde(default = "SimConfig::default_max_ticks")]
    pub max_ticks: u64,

    /// Directory receiving the per-job, per-sub-job output files.
    #[serde(default = "SimConfig::default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "SimConfig::default_log_path")]
    pub log_path: PathBuf,
}

impl SimConfig {
    fn default_device_delay() -> u32 {
        defaults::DEVICE_DELAY
    }

    fn default_max_ticks() -> u64 {
        defaults::MAX_TICKS
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from(".")
    }

    fn default_log_path() -> PathBuf {
        PathBuf::from(defaults::LOG_PATH)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_delay == 0 {
            return Err(ConfigError::Invalid("device_delay must be at least 1".into()));
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::Invalid("max_ticks must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_delay: Self::default_device_delay(),
            max_ticks: Self::default_max_ticks(),
            output_dir: Self::default_output_dir(),
            log_path: Self::default_log_path(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::from_json("{}").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.device_delay, 10);
        assert_eq!(config.max_ticks, 1 << 20);
    }

    #[test]
    fn test_round_trip() {
        let config = SimConfig {
            device_delay: 3,
            max_ticks: 500,
            output_dir: PathBuf::from("out"),
            log_path: PathBuf::from("sim.log"),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SimConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SimConfig::from_json(r#"{"device_delay": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{"delay": 4}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{"max_ticks": 77}"#).unwrap();
        assert_eq!(SimConfig::load(&path).unwrap().max_ticks, 77);
        assert!(matches!(
            SimConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}

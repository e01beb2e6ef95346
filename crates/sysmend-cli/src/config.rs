//! Configuration file management.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sysmend_core::BackoffPolicy;

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_backoff_ceiling_secs() -> u64 {
    300
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sensor polling cadence in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Backoff base delay in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Backoff ceiling in seconds
    #[serde(default = "default_backoff_ceiling_secs")]
    pub backoff_ceiling_secs: u64,

    /// Preferred sensor key (e.g. "CPU")
    #[serde(default)]
    pub preferred_sensor: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_ceiling_secs: default_backoff_ceiling_secs(),
            preferred_sensor: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Polling cadence as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Backoff policy built from the configured base and ceiling.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_ceiling_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.backoff_base_secs, 1);
        assert_eq!(config.backoff_ceiling_secs, 300);
        assert!(config.backoff_policy().validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/sysmend.toml")).unwrap();
        assert_eq!(config.poll_interval_secs, 2);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysmend.toml");
        fs::write(&path, "preferred_sensor = \"CPU\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.preferred_sensor.as_deref(), Some("CPU"));
        assert_eq!(config.backoff_ceiling_secs, 300);
    }
}

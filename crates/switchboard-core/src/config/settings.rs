use crate::Result;
use crate::routing::DEFAULT_ROUTING_CAPACITY;
use crate::sink::SinkMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Fabric configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub function: FunctionConfig,

    #[serde(default)]
    pub driver: DriverConfig,
}

impl BusConfig {
    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Mode for queued sinks built from this config.
    #[must_use]
    pub fn queued_mode(&self) -> SinkMode {
        SinkMode::Queued {
            capacity: self.queue.capacity,
        }
    }
}

/// Queued sink sizing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Maximum queued messages; unbounded when absent
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(default = "default_table_capacity")]
    pub table_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(default = "default_function_poll")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_function_timeout")]
    pub timeout_ms: u64,
}

impl FunctionConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    #[serde(default = "default_driver_poll")]
    pub poll_interval_ms: u64,
}

impl DriverConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_table_capacity() -> usize {
    DEFAULT_ROUTING_CAPACITY
}
fn default_function_poll() -> u64 {
    20
}
fn default_function_timeout() -> u64 {
    5000
}
fn default_driver_poll() -> u64 {
    50
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            table_capacity: default_table_capacity(),
        }
    }
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_function_poll(),
            timeout_ms: default_function_timeout(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_driver_poll(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.queue.capacity, None);
        assert_eq!(config.routing.table_capacity, 32);
        assert_eq!(config.function.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.function.timeout(), Duration::from_secs(5));
        assert_eq!(config.driver.poll_interval_ms, 50);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let json = r#"{"function": {"timeoutMs": 250}, "queue": {"capacity": 8}}"#;
        let config: BusConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.function.timeout_ms, 250);
        assert_eq!(config.function.poll_interval_ms, 20);
        assert_eq!(config.queue.capacity, Some(8));
        assert_eq!(config.queued_mode(), SinkMode::Queued { capacity: Some(8) });
    }

    #[test]
    fn test_save_and_load() {
        let mut config = BusConfig::default();
        config.routing.table_capacity = 64;
        config.driver.poll_interval_ms = 10;

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = BusConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = BusConfig::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(loaded, BusConfig::default());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(BusConfig::load(file.path()).is_err());
    }
}

//! Configuration file support.
//!
//! Loads and validates simulator configuration from TOML files.
//! Default location: ./l2sim.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SimError, SimResult};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "l2sim.toml";

/// Port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Enable every port when the switch starts
    #[serde(default = "default_enabled_at_start")]
    pub enabled_at_start: bool,

    /// Depth of each per-port channel, in frames
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,
}

/// Delivery configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Give up on a single delivery after this many milliseconds.
    /// Unset means a full channel blocks the sender until it drains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for per-port log files
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Write per-port log files at all
    #[serde(default = "default_port_files")]
    pub port_files: bool,
}

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_enabled_at_start() -> bool {
    true
}

fn default_channel_depth() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_port_files() -> bool {
    true
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            enabled_at_start: default_enabled_at_start(),
            channel_depth: default_channel_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            port_files: default_port_files(),
        }
    }
}

impl SimConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SimError::invalid_config(path.display().to_string(), e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(SimError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SimError::invalid_config("config", e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Bounded wait per delivery, if configured
    pub fn send_timeout(&self) -> Option<Duration> {
        self.delivery.send_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration
    pub fn validate(&self) -> SimResult<()> {
        if self.ports.channel_depth == 0 {
            return Err(SimError::invalid_config(
                "ports.channel_depth",
                "must be > 0",
            ));
        }

        if self.delivery.send_timeout_ms == Some(0) {
            return Err(SimError::invalid_config(
                "delivery.send_timeout_ms",
                "must be > 0 when set",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(SimError::invalid_config("logging.level", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert!(config.ports.enabled_at_start);
        assert_eq!(config.ports.channel_depth, 5);
        assert_eq!(config.delivery.send_timeout_ms, None);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.port_files);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_depth() {
        let mut config = SimConfig::default();
        config.ports.channel_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = SimConfig::default();
        config.delivery.send_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_send_timeout_duration() {
        let mut config = SimConfig::default();
        assert_eq!(config.send_timeout(), None);
        config.delivery.send_timeout_ms = Some(250);
        assert_eq!(config.send_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[ports]
enabled_at_start = false

[delivery]
send_timeout_ms = 100
"#;
        let config: SimConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.ports.enabled_at_start);
        assert_eq!(config.delivery.send_timeout_ms, Some(100));
        // Unspecified values should use defaults
        assert_eq!(config.ports.channel_depth, 5);
        assert_eq!(config.logging.dir, PathBuf::from("."));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l2sim.toml");

        let mut config = SimConfig::default();
        config.logging.level = "debug".to_string();
        config.save(&path).unwrap();

        assert_eq!(SimConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SimConfig::load_or_default("/nonexistent/l2sim.toml").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[ports\nchannel_depth = ").unwrap();
        assert!(matches!(
            SimConfig::load_or_default(&path),
            Err(SimError::InvalidConfig { .. })
        ));
    }
}

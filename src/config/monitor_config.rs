use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::{Timeouts, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SCAN_TIMEOUT_SECS};
use crate::utils::ensure_directory_exists;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds to scan before giving up on finding a sensor
    pub scan_timeout_secs: u64,

    /// Seconds to wait for a connection to complete
    pub connect_timeout_secs: u64,

    /// Log level name ("error", "warn", "info", "debug", "trace")
    pub log_level: String,

    /// Seconds to wait before scanning again after a timeout or disconnection.
    /// `None` leaves the monitor disconnected.
    pub rescan_delay_secs: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_level: "info".to_string(),
            rescan_delay_secs: None,
        }
    }
}

/// Where a loaded [`MonitorConfig`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Default,
}

impl MonitorConfig {
    /// Loads the config from a configuration file.
    pub async fn load(file_path: &Path) -> Result<Self> {
        let (config, source) = Self::load_with_source(file_path).await?;
        match source {
            ConfigSource::File => info!("Config loaded from {:?}", file_path),
            ConfigSource::Default => warn!("Config file not found at {:?}, using default.", file_path),
        }
        Ok(config)
    }

    /// Loads the config without logging, reporting whether the file existed.
    /// Used before the logger is installed.
    pub async fn load_with_source(file_path: &Path) -> Result<(Self, ConfigSource)> {
        if !file_path.exists() {
            return Ok((Self::default(), ConfigSource::Default));
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        Ok((config, ConfigSource::File))
    }

    /// Saves the current config to a configuration file.
    pub async fn save(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize monitor config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Monitor config saved to {:?}.", file_path);
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            scan: Duration::from_secs(self.scan_timeout_secs),
            connect: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn rescan_delay(&self) -> Option<Duration> {
        self.rescan_delay_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("heart_rate_monitor_test_{}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let config = MonitorConfig::load(&temp_path("does_not_exist.json")).await.unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[tokio::test]
    async fn reports_where_config_came_from() {
        let (config, source) = MonitorConfig::load_with_source(&temp_path("absent.json"))
            .await
            .unwrap();
        assert_eq!(source, ConfigSource::Default);
        assert_eq!(config, MonitorConfig::default());

        let path = temp_path("present.json");
        let saved = MonitorConfig {
            rescan_delay_secs: Some(5),
            ..MonitorConfig::default()
        };
        saved.save(&path).await.unwrap();
        let (config, source) = MonitorConfig::load_with_source(&path).await.unwrap();
        assert_eq!(source, ConfigSource::File);
        assert_eq!(config, saved);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_then_load() {
        let path = temp_path("saved.json");
        let config = MonitorConfig {
            scan_timeout_secs: 30,
            connect_timeout_secs: 4,
            log_level: "debug".into(),
            rescan_delay_secs: Some(2),
        };
        config.save(&path).await.unwrap();

        let loaded = MonitorConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MonitorConfig = serde_json::from_str(r#"{ "scan_timeout_secs": 3 }"#).unwrap();
        assert_eq!(config.scan_timeout_secs, 3);
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.rescan_delay(), None);
    }

    #[test]
    fn converts_to_timeouts() {
        let config = MonitorConfig {
            scan_timeout_secs: 12,
            connect_timeout_secs: 7,
            ..MonitorConfig::default()
        };
        let timeouts = config.timeouts();
        assert_eq!(timeouts.scan, Duration::from_secs(12));
        assert_eq!(timeouts.connect, Duration::from_secs(7));
    }
}

// Command implementations

pub mod init;
pub mod rebaseline;
pub mod run;
pub mod scan;
pub mod status;

use anyhow::{Context, Result};
use drift_watch_core::monitor::MonitorConfig;
use drift_watch_core::monitor::config::DEFAULT_CONFIG_PATH;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load configuration from an explicit path, the default location, or defaults
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    match path {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                info!("Using configuration from {}", DEFAULT_CONFIG_PATH);
                Ok(MonitorConfig::load(&default_path)?)
            } else {
                info!("No config file found, using defaults");
                Ok(MonitorConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drift.toml");
        std::fs::write(&path, "threshold_percent = 25.0\ncooldown_secs = 60\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.threshold_percent, 25.0);
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.poll_interval_secs, 30);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let error = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(error.to_string().contains("absent.toml"));
    }
}

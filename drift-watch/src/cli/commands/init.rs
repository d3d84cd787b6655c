//! Init command - write a default configuration

use crate::cli::app::InitArgs;
use anyhow::Result;
use drift_watch_core::monitor::MonitorConfig;
use drift_watch_core::monitor::config::DEFAULT_CONFIG_PATH;
use std::path::{Path, PathBuf};
use tracing::info;

const CONFIG_HEADER: &str = "\
# drift-watch configuration
#
# Weighted change is measured against the committed baseline. Once it reaches
# threshold_percent of the baseline's weighted size, [trigger].command runs
# (at most once per cooldown_secs). Without a command the trigger only logs.
#
# Entries in [weight_table] override the built-in weights per extension;
# extensions left out keep their default weight.
#
# [trigger]
# command = [\"make\", \"docs\"]
# timeout_secs = 600

";

const STATE_GITIGNORE: &str = "# Generated by drift-watch\nbaseline.json\n*.tmp\n";

pub async fn execute(args: InitArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    info!("Initializing drift-watch configuration at {}", config_path.display());

    let config = MonitorConfig::default();
    if config_path.exists() && !args.force {
        println!("Config file already exists at {}", config_path.display());
    } else {
        write_config(&config_path, &config).await?;
        println!("Created {} with default configuration", config_path.display());
    }

    tokio::fs::create_dir_all(&config.state_dir).await?;
    let gitignore_path = config.state_dir.join(".gitignore");
    if !gitignore_path.exists() {
        tokio::fs::write(&gitignore_path, STATE_GITIGNORE).await?;
        println!("Created {}", gitignore_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Review and customize {}", config_path.display());
    println!("  2. Run 'drift-watch rebaseline' to accept the current tree");
    println!("  3. Run 'drift-watch run' to start monitoring");
    println!("  4. Use 'drift-watch status' to check accumulated drift");

    Ok(())
}

async fn write_config(path: &Path, config: &MonitorConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = format!("{}{}", CONFIG_HEADER, config.to_toml()?);
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_written_config_parses_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_config(&path, &MonitorConfig::default()).await.unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded.threshold_percent, 10.0);
        assert_eq!(loaded.cooldown_secs, 300);
        assert_eq!(loaded.weight_table, MonitorConfig::default().weight_table);
    }
}

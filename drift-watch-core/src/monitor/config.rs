//! Monitor configuration, loaded from TOML

use super::ConfigError;
use super::classifier::WeightTable;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = ".drift-watch/config.toml";

/// Name of the persisted baseline inside the state directory
pub const BASELINE_FILE: &str = "baseline.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directories to scan
    pub roots: Vec<PathBuf>,
    /// Glob patterns matched against root-relative paths
    pub exclude_patterns: Vec<String>,
    /// Extension (or "default") to weight. Entries override the built-in
    /// table one key at a time; unlisted extensions keep their defaults.
    #[serde(deserialize_with = "merge_default_weights")]
    pub weight_table: BTreeMap<String, f64>,
    /// Percentage of baseline weighted size that must accumulate to fire
    pub threshold_percent: f64,
    pub cooldown_secs: u64,
    pub poll_interval_secs: u64,
    pub scan_timeout_secs: u64,
    /// Store the committed baseline under `state_dir`
    pub persist_baseline: bool,
    pub state_dir: PathBuf,
    /// Detect same-size edits by hashing file contents
    pub hash_contents: bool,
    /// Maximum number of concurrent stat/hash workers
    pub scan_concurrency: usize,
    /// Minimum magnitude of a modification event
    pub modified_epsilon: f64,
    pub backoff: BackoffConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_secs: u64,
    pub multiplier: f64,
    pub max_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Program and arguments to run when the threshold fires
    pub command: Vec<String>,
    /// Upper bound on one trigger invocation
    pub timeout_secs: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            exclude_patterns: vec![
                "**/.git".to_string(),
                "**/.git/**".to_string(),
                "**/.hg".to_string(),
                "**/target".to_string(),
                "**/node_modules".to_string(),
                "**/.drift-watch".to_string(),
                "**/tmp".to_string(),
                "**/logs".to_string(),
                "**/*.log".to_string(),
                "**/*.tmp".to_string(),
            ],
            weight_table: WeightTable::default_entries(),
            threshold_percent: 10.0,
            cooldown_secs: 300,
            poll_interval_secs: 30,
            scan_timeout_secs: 60,
            persist_baseline: true,
            state_dir: PathBuf::from(".drift-watch"),
            hash_contents: false,
            scan_concurrency: 8,
            modified_epsilon: 1.0,
            backoff: BackoffConfig::default(),
            trigger: TriggerConfig::default(),
        }
    }
}

/// Layer configured weights over [`WeightTable::default_entries`]
fn merge_default_weights<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<String, f64>::deserialize(deserializer)?;
    let mut merged = WeightTable::default_entries();
    for (extension, weight) in configured {
        merged.insert(extension.trim_start_matches('.').to_lowercase(), weight);
    }
    Ok(merged)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { initial_secs: 5, multiplier: 2.0, max_secs: 300 }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every setting, including that each root is a readable directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_percent.is_finite() || self.threshold_percent <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold_percent));
        }
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        WeightTable::from_entries(&self.weight_table)?;
        self.exclude_set()?;

        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be at least one second"));
        }
        if self.scan_timeout_secs == 0 {
            return Err(invalid("scan_timeout_secs", "must be at least one second"));
        }
        if self.scan_concurrency == 0 {
            return Err(invalid("scan_concurrency", "must be at least 1"));
        }
        if !self.modified_epsilon.is_finite() || self.modified_epsilon < 0.0 {
            return Err(invalid("modified_epsilon", "must be a non-negative number"));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(invalid("backoff.multiplier", "must be at least 1.0"));
        }
        if self.backoff.max_secs < self.backoff.initial_secs {
            return Err(invalid("backoff.max_secs", "must not be below backoff.initial_secs"));
        }
        if self.trigger.command.first().is_some_and(|program| program.trim().is_empty()) {
            return Err(invalid("trigger.command", "program name is empty"));
        }

        for root in &self.roots {
            check_root(root)?;
        }

        Ok(())
    }

    /// Compile the exclusion patterns
    pub fn exclude_set(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ConfigError::InvalidPattern {
            pattern: self.exclude_patterns.join(", "),
            reason: e.to_string(),
        })
    }

    pub fn weights(&self) -> Result<WeightTable, ConfigError> {
        WeightTable::from_entries(&self.weight_table)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.state_dir.join(BASELINE_FILE)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting { field, reason: reason.to_string() }
}

fn check_root(root: &Path) -> Result<(), ConfigError> {
    let unreadable = |reason: String| ConfigError::UnreadableRoot { path: root.to_path_buf(), reason };

    let metadata = fs::metadata(root).map_err(|e| unreadable(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(unreadable("not a directory".to_string()));
    }
    fs::read_dir(root).map_err(|e| unreadable(e.to_string()))?;
    Ok(())
}

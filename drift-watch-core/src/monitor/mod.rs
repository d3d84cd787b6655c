//! Weighted directory drift monitoring
//!
//! This module watches one or more file trees by periodic scanning and fires
//! a trigger once enough weighted change has piled up against the committed
//! baseline:
//! - Snapshot building with glob exclusions and a per-extension weight table
//! - Baseline storage with optional on-disk persistence
//! - Baseline/current diffing that ignores timestamp-only touches
//! - Session accumulation and a threshold/cooldown gate
//! - Trigger dispatch with exponential backoff on failure

pub mod baseline;
pub mod classifier;
pub mod config;
pub mod diff;
pub mod engine;
pub mod gate;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod trigger;

pub use baseline::{BaselineOrigin, BaselineStore, PersistedBaseline};
pub use classifier::{FileCategory, WeightTable};
pub use config::{BackoffConfig, MonitorConfig, TriggerConfig};
pub use diff::{ChangeEvent, ChangeKind, diff_snapshots};
pub use engine::{CycleOutcome, DriftMonitor};
pub use gate::{CooldownState, GateDecision, GateState, TriggerGate};
pub use session::ChangeSession;
pub use snapshot::{FileRecord, ScanWarning, Snapshot, SnapshotBuilder};
pub use status::{StatusHandle, StatusReport};
pub use trigger::{CommandTrigger, Dispatcher, LogTrigger, Trigger, TriggerContext};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures that abandon a single scan cycle
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Root {path:?} is not a readable directory: {reason}")]
    RootUnreadable { path: PathBuf, reason: String },

    #[error("Scan exceeded timeout of {0:?}")]
    Timeout(Duration),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

/// Failures reported by a trigger invocation
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Failed to spawn trigger command: {0}")]
    Spawn(String),

    #[error("Trigger command exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Trigger timed out after {0:?}")]
    Timeout(Duration),

    #[error("Trigger failed: {0}")]
    Other(String),
}

/// Invalid configuration, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Threshold must be a positive number, got {0}")]
    InvalidThreshold(f64),

    #[error("Weight for '{extension}' must be a positive number, got {weight}")]
    InvalidWeight { extension: String, weight: f64 },

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No roots configured")]
    NoRoots,

    #[error("Root {path:?} is not a readable directory: {reason}")]
    UnreadableRoot { path: PathBuf, reason: String },

    #[error("Invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Failed to read configuration {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Problems with persisted baseline state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Persisted baseline is corrupt: {0}")]
    Corrupt(String),

    #[error("Baseline I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Baseline serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Rejected gate transition
#[derive(Debug, Error)]
#[error("Invalid gate transition from {from} to {to}")]
pub struct GateError {
    pub from: GateState,
    pub to: GateState,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Convert a std duration into a chrono delta, saturating on overflow.
pub(crate) fn to_delta(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

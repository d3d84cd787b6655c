//! Committed baseline snapshot with optional on-disk persistence

use super::StateError;
use super::snapshot::{FileRecord, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Format version of the persisted record
pub const BASELINE_VERSION: u32 = 1;

/// Tolerance when re-checking the stored weighted total
const TOTAL_TOLERANCE: f64 = 1e-6;

/// Why a snapshot became the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineOrigin {
    /// First scan after startup
    Initial,
    /// Committed by a successful trigger dispatch
    Trigger,
    /// Committed by an operator without firing
    Rebaseline,
}

/// On-disk form of a committed baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedBaseline {
    pub version: u32,
    pub committed_at: DateTime<Utc>,
    pub origin: BaselineOrigin,
    pub taken_at: DateTime<Utc>,
    pub total_weighted_size: f64,
    /// Most recent successful fire, kept across re-baselines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger_at: Option<DateTime<Utc>>,
    pub files: Vec<FileRecord>,
}

impl PersistedBaseline {
    fn from_snapshot(
        snapshot: &Snapshot,
        committed_at: DateTime<Utc>,
        origin: BaselineOrigin,
        last_trigger_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            version: BASELINE_VERSION,
            committed_at,
            origin,
            last_trigger_at,
            taken_at: snapshot.taken_at,
            total_weighted_size: snapshot.total_weighted_size(),
            files: snapshot.files().values().cloned().collect(),
        }
    }

    fn into_snapshot(self) -> Result<Snapshot, StateError> {
        if self.version != BASELINE_VERSION {
            return Err(StateError::Corrupt(format!(
                "unsupported version {} (expected {})",
                self.version, BASELINE_VERSION
            )));
        }

        let expected = self.files.len();
        let snapshot = Snapshot::new(self.taken_at, self.files);
        if snapshot.len() != expected {
            return Err(StateError::Corrupt("duplicate paths in file list".to_string()));
        }
        if (snapshot.total_weighted_size() - self.total_weighted_size).abs()
            > TOTAL_TOLERANCE * self.total_weighted_size.abs().max(1.0)
        {
            return Err(StateError::Corrupt(format!(
                "stored weighted size {} does not match files ({})",
                self.total_weighted_size,
                snapshot.total_weighted_size()
            )));
        }
        if snapshot.files().values().any(|r| !r.weight.is_finite() || r.weight <= 0.0) {
            return Err(StateError::Corrupt("non-positive weight in file list".to_string()));
        }
        Ok(snapshot)
    }
}

/// Holds the single committed baseline.
///
/// The snapshot lives behind an `Arc`; committing swaps the reference, so
/// readers holding an earlier `Arc` keep a consistent view.
pub struct BaselineStore {
    current: Option<Arc<Snapshot>>,
    committed_at: Option<DateTime<Utc>>,
    origin: Option<BaselineOrigin>,
    last_trigger_at: Option<DateTime<Utc>>,
    path: Option<PathBuf>,
}

impl BaselineStore {
    /// In-memory store
    pub fn new() -> Self {
        Self { current: None, committed_at: None, origin: None, last_trigger_at: None, path: None }
    }

    /// Store that writes every commit to `path`
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()), ..Self::new() }
    }

    /// Load a previously persisted baseline, if any.
    ///
    /// A missing file is not an error. A corrupt file is reported so the
    /// caller can fall back to a fresh scan.
    pub fn restore(&mut self) -> Result<bool, StateError> {
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };
        if !path.exists() {
            debug!("No persisted baseline at {:?}", path);
            return Ok(false);
        }

        let record = read_record(&path)?;
        let committed_at = record.committed_at;
        let origin = record.origin;
        let last_trigger_at = record
            .last_trigger_at
            .or((origin == BaselineOrigin::Trigger).then_some(committed_at));
        let snapshot = record.into_snapshot()?;

        info!(
            "Restored baseline from {:?}: {} files committed at {}",
            path,
            snapshot.len(),
            committed_at
        );
        self.current = Some(Arc::new(snapshot));
        self.committed_at = Some(committed_at);
        self.origin = Some(origin);
        self.last_trigger_at = last_trigger_at;
        Ok(true)
    }

    /// Replace the baseline and persist it when enabled.
    ///
    /// A `Trigger` commit also records the fire time; other origins carry the
    /// previous fire time forward. The in-memory swap happens even if
    /// persistence fails; the error is returned so the caller can log it.
    pub fn commit(
        &mut self,
        snapshot: Arc<Snapshot>,
        committed_at: DateTime<Utc>,
        origin: BaselineOrigin,
    ) -> Result<(), StateError> {
        debug!("Committing baseline of {} files ({:?})", snapshot.len(), origin);
        let last_trigger_at = match origin {
            BaselineOrigin::Trigger => Some(committed_at),
            _ => self.last_trigger_at,
        };
        let persisted = match &self.path {
            Some(path) => write_record(
                path,
                &PersistedBaseline::from_snapshot(&snapshot, committed_at, origin, last_trigger_at),
            ),
            None => Ok(()),
        };

        self.current = Some(snapshot);
        self.committed_at = Some(committed_at);
        self.origin = Some(origin);
        self.last_trigger_at = last_trigger_at;

        if let Err(e) = &persisted {
            warn!("Failed to persist baseline: {}", e);
        }
        persisted
    }

    /// Point-in-time handle to the committed snapshot
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committed_at
    }

    pub fn origin(&self) -> Option<BaselineOrigin> {
        self.origin
    }

    /// Time of the most recent successful fire, if any
    pub fn last_trigger_at(&self) -> Option<DateTime<Utc>> {
        self.last_trigger_at
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a persisted baseline without installing it
pub fn read_record(path: &Path) -> Result<PersistedBaseline, StateError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| StateError::Corrupt(e.to_string()))
}

/// Write atomically: temp file in the same directory, then rename
fn write_record(path: &Path, record: &PersistedBaseline) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let json = serde_json::to_vec_pretty(record)?;
    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    file.write_all(&json)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| StateError::Io(e.error))?;

    debug!("Baseline saved to {:?}", path);
    Ok(())
}

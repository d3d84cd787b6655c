//! Weighted file inventory of the monitored roots

use super::classifier::{FileCategory, WeightTable};
use super::config::MonitorConfig;
use super::{ConfigError, ScanError};
use chrono::{DateTime, Utc};
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// One tracked file at the time of a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Root-relative path with `/` separators
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub category: FileCategory,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FileRecord {
    pub fn weighted_size(&self) -> f64 {
        self.weight * self.size as f64
    }
}

/// Entry skipped during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Immutable inventory of tracked files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    files: BTreeMap<String, FileRecord>,
    total_weighted_size: f64,
    #[serde(default)]
    warnings: Vec<ScanWarning>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self::with_warnings(taken_at, records, Vec::new())
    }

    pub fn with_warnings(
        taken_at: DateTime<Utc>,
        records: impl IntoIterator<Item = FileRecord>,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let files: BTreeMap<String, FileRecord> =
            records.into_iter().map(|record| (record.path.clone(), record)).collect();
        let total_weighted_size = files.values().map(FileRecord::weighted_size).sum();

        Self { taken_at, files, total_weighted_size, warnings }
    }

    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self::new(taken_at, Vec::new())
    }

    /// Records in lexicographic path order
    pub fn files(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Σ weight × size over every record
    pub fn total_weighted_size(&self) -> f64 {
        self.total_weighted_size
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }
}

/// A regular file found by the walk, waiting to be stat'ed
struct Candidate {
    absolute: PathBuf,
    relative: String,
}

/// Walks the configured roots and produces snapshots
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    roots: Vec<PathBuf>,
    excludes: Arc<GlobSet>,
    weights: Arc<WeightTable>,
    /// Directories never scanned regardless of exclusion patterns
    ignored_dirs: Vec<PathBuf>,
    hash_contents: bool,
    concurrency: usize,
}

impl SnapshotBuilder {
    pub fn new(
        roots: Vec<PathBuf>,
        excludes: GlobSet,
        weights: WeightTable,
        hash_contents: bool,
        concurrency: usize,
    ) -> Self {
        Self {
            roots,
            excludes: Arc::new(excludes),
            weights: Arc::new(weights),
            ignored_dirs: Vec::new(),
            hash_contents,
            concurrency: concurrency.max(1),
        }
    }

    /// Builder for the configured roots. The monitor's own state directory
    /// is always skipped so persisted baselines never count as drift.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.roots.clone(),
            config.exclude_set()?,
            config.weights()?,
            config.hash_contents,
            config.scan_concurrency,
        )
        .with_ignored_dir(config.state_dir.clone()))
    }

    /// Prune `dir` from every walk, whatever the exclusion patterns say
    pub fn with_ignored_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ignored_dirs.push(dir.into());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Scan every root and return a new snapshot.
    ///
    /// Dropping the returned future abandons any outstanding stat calls.
    pub async fn build(&self) -> Result<Snapshot, ScanError> {
        let taken_at = Utc::now();
        let multi_root = self.roots.len() > 1;
        let mut warnings = Vec::new();
        let mut candidates = Vec::new();

        for (index, root) in self.roots.iter().enumerate() {
            let prefix = multi_root.then(|| format!("{}:", index));
            let root = root.clone();
            let excludes = self.excludes.clone();
            let ignored = self.ignored_dirs.clone();
            let (found, walk_warnings) = tokio::task::spawn_blocking(move || {
                walk_root(&root, prefix.as_deref(), &excludes, &ignored)
            })
            .await
            .map_err(|e| ScanError::Worker(e.to_string()))??;
            candidates.extend(found);
            warnings.extend(walk_warnings);
        }

        debug!("Walk found {} candidate files", candidates.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for candidate in candidates {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ScanError::Worker(e.to_string()))?;
            let weights = self.weights.clone();
            let hash_contents = self.hash_contents;
            tasks.spawn_blocking(move || {
                let _permit = permit;
                inspect(candidate, &weights, hash_contents)
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| ScanError::Worker(e.to_string()))? {
                Ok(record) => records.push(record),
                Err(warning) => {
                    warn!("Skipping {:?}: {}", warning.path, warning.message);
                    warnings.push(warning);
                }
            }
        }

        let snapshot = Snapshot::with_warnings(taken_at, records, warnings);
        debug!(
            "Snapshot has {} files, weighted size {:.1}, {} warnings",
            snapshot.len(),
            snapshot.total_weighted_size(),
            snapshot.warnings().len()
        );
        Ok(snapshot)
    }
}

/// Collect regular files under `root`, pruning excluded and ignored directories
fn walk_root(
    root: &Path,
    prefix: Option<&str>,
    excludes: &GlobSet,
    ignored_dirs: &[PathBuf],
) -> Result<(Vec<Candidate>, Vec<ScanWarning>), ScanError> {
    let unreadable = |reason: String| ScanError::RootUnreadable { path: root.to_path_buf(), reason };

    let metadata = fs::metadata(root).map_err(|e| unreadable(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(unreadable("not a directory".to_string()));
    }
    fs::read_dir(root).map_err(|e| unreadable(e.to_string()))?;

    // Links are not followed, so every directory below a canonical root is
    // itself canonical and can be compared to the ignored paths directly.
    let root = fs::canonicalize(root).map_err(|e| unreadable(e.to_string()))?;
    let root = root.as_path();
    let ignored: Vec<PathBuf> =
        ignored_dirs.iter().filter_map(|dir| fs::canonicalize(dir).ok()).collect();

    let mut candidates = Vec::new();
    let mut warnings = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        if entry.file_type().is_dir() && ignored.iter().any(|dir| dir == entry.path()) {
            trace!("Skipping state directory {:?}", entry.path());
            return false;
        }
        match relative_path(root, entry.path()) {
            Some(relative) => !excludes.is_match(&relative),
            None => true,
        }
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!("Unreadable entry {:?}: {}", path, e);
                warnings.push(ScanWarning { path, message: e.to_string() });
                continue;
            }
        };

        // Symlinks are reported as such because links are not followed
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };
        trace!("Found {}", relative);

        let relative = match prefix {
            Some(prefix) => format!("{}{}", prefix, relative),
            None => relative,
        };
        candidates.push(Candidate { absolute: entry.into_path(), relative });
    }

    Ok((candidates, warnings))
}

/// Root-relative path with `/` separators
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

fn inspect(
    candidate: Candidate,
    weights: &WeightTable,
    hash_contents: bool,
) -> Result<FileRecord, ScanWarning> {
    let warning = |message: String| ScanWarning { path: candidate.absolute.clone(), message };

    let metadata = fs::symlink_metadata(&candidate.absolute).map_err(|e| warning(e.to_string()))?;
    let (category, weight) = weights.classify(&candidate.absolute);
    let hash = if hash_contents {
        Some(hash_file(&candidate.absolute).map_err(|e| warning(e.to_string()))?)
    } else {
        None
    };

    Ok(FileRecord {
        path: candidate.relative.clone(),
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        category,
        weight,
        hash,
    })
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use globset::{Glob, GlobSetBuilder};
    use tempfile::TempDir;

    fn excludes(patterns: &[&str]) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern).unwrap());
        }
        builder.build().unwrap()
    }

    fn builder_for(roots: Vec<PathBuf>, patterns: &[&str], hash: bool) -> SnapshotBuilder {
        SnapshotBuilder::new(roots, excludes(patterns), WeightTable::default(), hash, 4)
    }

    #[tokio::test]
    async fn test_snapshot_weights_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/guide.md"), "12345").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let snapshot = builder_for(vec![dir.path().to_path_buf()], &[], false).build().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        let guide = snapshot.get("docs/guide.md").unwrap();
        assert_eq!(guide.size, 5);
        assert_eq!(guide.category, FileCategory::Documentation);
        assert_eq!(guide.weight, 20.0);
        assert!(guide.hash.is_none());
        assert_eq!(snapshot.total_weighted_size(), 5.0 * 20.0 + 12.0 * 10.0);
    }

    #[tokio::test]
    async fn test_excluded_directories_are_pruned() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::create_dir_all(dir.path().join("src/node_modules/pkg")).unwrap();
        fs::write(dir.path().join(".git/objects/abc"), "blob").unwrap();
        fs::write(dir.path().join("src/node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "x").unwrap();
        fs::write(dir.path().join("build.log"), "x").unwrap();

        let snapshot = builder_for(
            vec![dir.path().to_path_buf()],
            &["**/.git", "**/node_modules", "**/*.log"],
            false,
        )
        .build()
        .await
        .unwrap();

        let paths: Vec<_> = snapshot.files().keys().cloned().collect();
        assert_eq!(paths, vec!["src/lib.rs".to_string()]);
    }

    #[tokio::test]
    async fn test_ignored_dir_is_pruned_without_pattern() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(dir.path().join("state/baseline.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.md"), "x").unwrap();

        // Relative spelling of the ignored directory still matches.
        let ignored = dir.path().join("state/../state");
        let snapshot = builder_for(vec![dir.path().to_path_buf()], &["**/.git"], false)
            .with_ignored_dir(ignored)
            .build()
            .await
            .unwrap();

        let paths: Vec<_> = snapshot.files().keys().cloned().collect();
        assert_eq!(paths, vec!["notes.md".to_string()]);
    }

    #[tokio::test]
    async fn test_config_state_dir_is_never_scanned() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(dir.path().join("state/baseline.json"), "{}").unwrap();
        fs::write(dir.path().join("data.dat"), "x").unwrap();

        let config = MonitorConfig {
            roots: vec![dir.path().to_path_buf()],
            exclude_patterns: vec!["**/.git".to_string()],
            state_dir: dir.path().join("state"),
            ..MonitorConfig::default()
        };
        let snapshot = SnapshotBuilder::from_config(&config).unwrap().build().await.unwrap();

        assert!(snapshot.get("state/baseline.json").is_none());
        assert!(snapshot.get("data.dat").is_some());
    }

    #[tokio::test]
    async fn test_missing_root_is_scan_error() {
        let dir = TempDir::new().unwrap();
        let result = builder_for(vec![dir.path().join("gone")], &[], false).build().await;
        assert!(matches!(result, Err(ScanError::RootUnreadable { .. })));
    }

    #[tokio::test]
    async fn test_multiple_roots_are_prefixed() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(first.path().join("a.md"), "a").unwrap();
        fs::write(second.path().join("a.md"), "b").unwrap();

        let snapshot = builder_for(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            &[],
            false,
        )
        .build()
        .await
        .unwrap();

        assert!(snapshot.get("0:a.md").is_some());
        assert!(snapshot.get("1:a.md").is_some());
    }

    #[tokio::test]
    async fn test_content_hash_when_enabled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "abc").unwrap();

        let snapshot = builder_for(vec![dir.path().to_path_buf()], &[], true).build().await.unwrap();

        assert_eq!(
            snapshot.get("a.txt").unwrap().hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/file.md"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real/file.md"), dir.path().join("link.md"))
            .unwrap();

        let snapshot = builder_for(vec![dir.path().to_path_buf()], &[], false).build().await.unwrap();

        let paths: Vec<_> = snapshot.files().keys().cloned().collect();
        assert_eq!(paths, vec!["real/file.md".to_string()]);
    }
}

//! Baseline/current comparison producing weighted change events

use super::snapshot::{FileRecord, Snapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::trace;

/// Default floor for the magnitude of a modification
pub const DEFAULT_MODIFIED_EPSILON: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A single classified difference from the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
    pub weight: f64,
    /// Weighted size of the change
    pub magnitude: f64,
}

/// Compare `current` against `baseline`.
///
/// Events come out in lexicographic path order. Files whose size (and hash,
/// when both sides carry one) match are unchanged whatever their mtime.
pub fn diff_snapshots(baseline: &Snapshot, current: &Snapshot, epsilon: f64) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut old = baseline.files().values().peekable();
    let mut new = current.files().values().peekable();

    loop {
        let order = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.path.cmp(&b.path),
        };

        match order {
            Ordering::Less => {
                if let Some(record) = old.next() {
                    events.push(removed(record));
                }
            }
            Ordering::Greater => {
                if let Some(record) = new.next() {
                    events.push(added(record));
                }
            }
            Ordering::Equal => {
                if let (Some(before), Some(after)) = (old.next(), new.next()) {
                    if let Some(event) = modified(before, after, epsilon) {
                        events.push(event);
                    }
                }
            }
        }
    }

    trace!("Diff produced {} events", events.len());
    events
}

fn added(record: &FileRecord) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Added,
        path: record.path.clone(),
        weight: record.weight,
        magnitude: record.weighted_size(),
    }
}

fn removed(record: &FileRecord) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Removed,
        path: record.path.clone(),
        weight: record.weight,
        magnitude: record.weighted_size(),
    }
}

fn modified(before: &FileRecord, after: &FileRecord, epsilon: f64) -> Option<ChangeEvent> {
    let size_changed = before.size != after.size;
    let hash_changed = match (&before.hash, &after.hash) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    };
    if !size_changed && !hash_changed {
        return None;
    }

    let delta = before.size.abs_diff(after.size) as f64;
    Some(ChangeEvent {
        kind: ChangeKind::Modified,
        path: after.path.clone(),
        weight: after.weight,
        magnitude: (after.weight * delta).max(epsilon),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::FileCategory;
    use chrono::{Duration, Utc};

    fn record(path: &str, size: u64, weight: f64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size,
            modified: Some(Utc::now()),
            category: FileCategory::Other,
            weight,
            hash: None,
        }
    }

    fn snapshot(records: Vec<FileRecord>) -> Snapshot {
        Snapshot::new(Utc::now(), records)
    }

    #[test]
    fn test_added_removed_modified() {
        let baseline = snapshot(vec![record("a.md", 10, 20.0), record("b.rs", 100, 10.0)]);
        let current = snapshot(vec![record("b.rs", 130, 10.0), record("c.toml", 4, 5.0)]);

        let events = diff_snapshots(&baseline, &current, DEFAULT_MODIFIED_EPSILON);

        assert_eq!(
            events,
            vec![
                ChangeEvent {
                    kind: ChangeKind::Removed,
                    path: "a.md".into(),
                    weight: 20.0,
                    magnitude: 200.0
                },
                ChangeEvent {
                    kind: ChangeKind::Modified,
                    path: "b.rs".into(),
                    weight: 10.0,
                    magnitude: 300.0
                },
                ChangeEvent {
                    kind: ChangeKind::Added,
                    path: "c.toml".into(),
                    weight: 5.0,
                    magnitude: 20.0
                },
            ]
        );
    }

    #[test]
    fn test_mtime_only_change_is_invisible() {
        let before = record("a.md", 10, 20.0);
        let mut after = before.clone();
        after.modified = before.modified.map(|t| t + Duration::hours(1));

        let events = diff_snapshots(&snapshot(vec![before]), &snapshot(vec![after]), 1.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_same_size_hash_change_uses_epsilon() {
        let mut before = record("a.md", 10, 20.0);
        before.hash = Some("aaa".into());
        let mut after = before.clone();
        after.hash = Some("bbb".into());

        let events = diff_snapshots(&snapshot(vec![before]), &snapshot(vec![after]), 1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Modified);
        assert_eq!(events[0].magnitude, 1.0);
    }

    #[test]
    fn test_hash_ignored_when_one_side_lacks_it() {
        let mut before = record("a.md", 10, 20.0);
        before.hash = Some("aaa".into());
        let after = record("a.md", 10, 20.0);

        assert!(diff_snapshots(&snapshot(vec![before]), &snapshot(vec![after]), 1.0).is_empty());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let baseline = snapshot((0..50).map(|i| record(&format!("f{i}.rs"), i, 1.0)).collect());
        let current =
            snapshot((25..75).map(|i| record(&format!("f{i}.rs"), i * 2, 1.0)).collect());

        let first = diff_snapshots(&baseline, &current, 1.0);
        let second = diff_snapshots(&baseline, &current, 1.0);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_identical_snapshots_have_no_events() {
        let records = vec![record("a", 1, 1.0), record("b", 2, 2.0)];
        assert!(diff_snapshots(&snapshot(records.clone()), &snapshot(records), 1.0).is_empty());
    }
}

//! Scan command - one-shot weighted snapshot of a tree

use crate::cli::app::ScanArgs;
use anyhow::{Context, Result};
use drift_watch_core::monitor::{MonitorConfig, Snapshot, SnapshotBuilder};
use std::collections::BTreeMap;
use tracing::info;

pub async fn execute(args: ScanArgs, mut config: MonitorConfig) -> Result<()> {
    if let Some(path) = args.path {
        config.roots = vec![path];
    }
    info!("Scanning {:?}", config.roots);

    let builder = SnapshotBuilder::from_config(&config)?;
    let timeout = config.scan_timeout();
    let snapshot = tokio::time::timeout(timeout, builder.build())
        .await
        .with_context(|| format!("Scan exceeded timeout of {:?}", timeout))??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot);
    }
    Ok(())
}

fn print_summary(snapshot: &Snapshot) {
    println!("Snapshot taken at {}", snapshot.taken_at.to_rfc3339());
    println!("  Files:          {}", snapshot.len());
    println!("  Weighted size:  {:.1}", snapshot.total_weighted_size());

    let breakdown = category_breakdown(snapshot);
    if !breakdown.is_empty() {
        println!("\n  By category:");
        for (category, (count, weighted)) in &breakdown {
            println!("    {:<14} {:>6} files  {:>14.1}", category, count, weighted);
        }
    }

    if !snapshot.warnings().is_empty() {
        println!("\n  Skipped {} entries:", snapshot.warnings().len());
        for warning in snapshot.warnings() {
            println!("    {}: {}", warning.path.display(), warning.message);
        }
    }
}

/// File count and weighted size per category
fn category_breakdown(snapshot: &Snapshot) -> BTreeMap<String, (usize, f64)> {
    let mut breakdown = BTreeMap::new();
    for record in snapshot.files().values() {
        let entry = breakdown.entry(record.category.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.weighted_size();
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drift_watch_core::monitor::{FileCategory, FileRecord};

    fn record(path: &str, size: u64, category: FileCategory, weight: f64) -> FileRecord {
        FileRecord { path: path.into(), size, modified: None, category, weight, hash: None }
    }

    #[test]
    fn test_breakdown_groups_by_category() {
        let snapshot = Snapshot::new(
            Utc::now(),
            vec![
                record("a.md", 10, FileCategory::Documentation, 20.0),
                record("b.md", 5, FileCategory::Documentation, 20.0),
                record("c.rs", 10, FileCategory::Code, 10.0),
            ],
        );

        let breakdown = category_breakdown(&snapshot);
        assert_eq!(breakdown[&FileCategory::Documentation.to_string()], (2, 300.0));
        assert_eq!(breakdown[&FileCategory::Code.to_string()], (1, 100.0));
    }
}

//! Rebaseline command - accept the current tree without firing

use anyhow::Result;
use chrono::Utc;
use drift_watch_core::monitor::{DriftMonitor, MonitorConfig};
use tracing::warn;

pub async fn execute(config: MonitorConfig) -> Result<()> {
    if !config.persist_baseline {
        warn!("persist_baseline is disabled; the new baseline only lives for this process");
    }

    let mut monitor = DriftMonitor::from_config(config)?;
    let files = monitor.rebaseline_at(Utc::now()).await?;

    match monitor.baseline_store().path() {
        Some(path) => println!("Baseline of {} files written to {}", files, path.display()),
        None => println!("Baseline of {} files committed", files),
    }
    Ok(())
}

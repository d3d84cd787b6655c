//! Status command - drift against the persisted baseline, read-only

use crate::cli::app::StatusArgs;
use anyhow::Result;
use chrono::Utc;
use drift_watch_core::monitor::{DriftMonitor, MonitorConfig};

pub async fn execute(args: StatusArgs, config: MonitorConfig) -> Result<()> {
    let monitor = DriftMonitor::from_config(config)?;

    if monitor.baseline().is_none() {
        println!("No baseline found. Run 'drift-watch rebaseline' or 'drift-watch run' first.");
        return Ok(());
    }

    let report = monitor.probe_at(Utc::now()).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Drift Status:");
        println!("{}", report.summary());
    }
    Ok(())
}

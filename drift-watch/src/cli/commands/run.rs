//! Run command - drive the monitor until interrupted

use crate::cli::app::RunArgs;
use anyhow::Result;
use chrono::Utc;
use drift_watch_core::monitor::{CycleOutcome, DriftMonitor, MonitorConfig};
use tokio::sync::mpsc;
use tracing::info;

pub async fn execute(args: RunArgs, config: MonitorConfig) -> Result<()> {
    let mut monitor = DriftMonitor::from_config(config)?;

    if args.once {
        let outcome = monitor.step().await?;
        println!("{}", describe(&outcome));
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    // Set up signal handler for graceful shutdown
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown_tx.send(()).await.ok();
    });

    monitor.run(shutdown_rx).await?;

    info!("Final status after {} cycles", monitor.cycles());
    println!("{}", monitor.status_at(Utc::now()).summary());
    Ok(())
}

fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::BaselineCreated { files } => {
            format!("Baseline created with {} files", files)
        }
        CycleOutcome::Unchanged => "No changes since the baseline".to_string(),
        CycleOutcome::Accumulating { weighted_percent } => {
            format!("Accumulating: {:.2}% weighted change", weighted_percent)
        }
        CycleOutcome::Deferred { weighted_percent, remaining } => format!(
            "Threshold reached ({:.2}%), firing after cooldown in {}s",
            weighted_percent,
            remaining.as_secs()
        ),
        CycleOutcome::Throttled { weighted_percent } => {
            format!("Threshold reached ({:.2}%), waiting for dispatch backoff", weighted_percent)
        }
        CycleOutcome::Fired { weighted_percent } => {
            format!("Trigger fired at {:.2}%, baseline committed", weighted_percent)
        }
        CycleOutcome::DispatchFailed { weighted_percent, error } => {
            format!("Trigger failed at {:.2}%: {}", weighted_percent, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_describe_outcomes() {
        assert_eq!(
            describe(&CycleOutcome::BaselineCreated { files: 3 }),
            "Baseline created with 3 files"
        );
        let deferred = describe(&CycleOutcome::Deferred {
            weighted_percent: 12.5,
            remaining: Duration::from_secs(90),
        });
        assert!(deferred.contains("12.50%"));
        assert!(deferred.contains("90s"));
    }
}

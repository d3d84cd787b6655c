//! Point-in-time status reporting

use super::gate::GateState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// Snapshot of the monitor for operators and collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: GateState,
    pub baseline_taken_at: Option<DateTime<Utc>>,
    pub baseline_committed_at: Option<DateTime<Utc>>,
    pub baseline_age: Option<Duration>,
    pub baseline_files: usize,
    pub weighted_percent: f64,
    pub threshold_percent: f64,
    pub cooldown_remaining: Option<Duration>,
    pub pending_fire: bool,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub cycles: u64,
    pub last_error: Option<String>,
}

impl StatusReport {
    pub fn initial(threshold_percent: f64) -> Self {
        Self {
            state: GateState::Idle,
            baseline_taken_at: None,
            baseline_committed_at: None,
            baseline_age: None,
            baseline_files: 0,
            weighted_percent: 0.0,
            threshold_percent,
            cooldown_remaining: None,
            pending_fire: false,
            added: 0,
            modified: 0,
            removed: 0,
            cycles: 0,
            last_error: None,
        }
    }

    /// Human-readable multi-line summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("State:            {}", self.state),
            format!(
                "Weighted change:  {:.2}% (threshold {:.2}%)",
                self.weighted_percent, self.threshold_percent
            ),
            format!(
                "Changes:          {} added, {} modified, {} removed",
                self.added, self.modified, self.removed
            ),
        ];

        match (self.baseline_committed_at, self.baseline_age) {
            (Some(at), Some(age)) => lines.push(format!(
                "Baseline:         {} files, committed {} ({}s ago)",
                self.baseline_files,
                at.to_rfc3339(),
                age.as_secs()
            )),
            _ => lines.push("Baseline:         none".to_string()),
        }

        match self.cooldown_remaining {
            Some(remaining) => {
                lines.push(format!("Cooldown:         {}s remaining", remaining.as_secs()))
            }
            None => lines.push("Cooldown:         inactive".to_string()),
        }

        if self.pending_fire {
            lines.push("Pending fire:     yes".to_string());
        }
        if let Some(error) = &self.last_error {
            lines.push(format!("Last error:       {}", error));
        }

        lines.join("\n")
    }
}

/// Read-only view of the latest published status
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<StatusReport>,
}

impl StatusHandle {
    pub(crate) fn new(rx: watch::Receiver<StatusReport>) -> Self {
        Self { rx }
    }

    /// Copy of the most recent report
    pub fn current(&self) -> StatusReport {
        self.rx.borrow().clone()
    }

    /// Wait until the monitor publishes a new report
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_mentions_key_fields() {
        let mut report = StatusReport::initial(10.0);
        report.weighted_percent = 4.5;
        report.added = 2;
        report.cooldown_remaining = Some(Duration::from_secs(42));
        report.last_error = Some("scan timed out".into());

        let summary = report.summary();
        assert!(summary.contains("4.50%"));
        assert!(summary.contains("2 added"));
        assert!(summary.contains("42s remaining"));
        assert!(summary.contains("Baseline:         none"));
        assert!(summary.contains("scan timed out"));
    }

    #[tokio::test]
    async fn test_handle_sees_published_reports() {
        let (tx, rx) = watch::channel(StatusReport::initial(10.0));
        let mut handle = StatusHandle::new(rx);

        let mut next = StatusReport::initial(10.0);
        next.cycles = 3;
        tx.send(next).unwrap();

        assert!(handle.changed().await);
        assert_eq!(handle.current().cycles, 3);
    }
}

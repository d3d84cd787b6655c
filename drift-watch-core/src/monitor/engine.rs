//! Polling loop driving scan, diff, gate and dispatch

use super::baseline::{BaselineOrigin, BaselineStore};
use super::config::MonitorConfig;
use super::diff::{ChangeKind, diff_snapshots};
use super::gate::{GateDecision, GateState, TriggerGate};
use super::session::ChangeSession;
use super::snapshot::{Snapshot, SnapshotBuilder};
use super::status::{StatusHandle, StatusReport};
use super::trigger::{self, Dispatcher, Trigger, TriggerContext};
use super::{Result, ScanError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Shortest pause between cycles
const MIN_DELAY: Duration = Duration::from_millis(100);

/// Result of a single monitoring cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No baseline existed; this scan became it
    BaselineCreated { files: usize },
    /// Nothing differs from the baseline and nothing has accumulated
    Unchanged,
    /// Change is accumulating below the threshold
    Accumulating { weighted_percent: f64 },
    /// Threshold reached inside the cooldown window
    Deferred { weighted_percent: f64, remaining: Duration },
    /// Threshold reached but dispatch is backing off
    Throttled { weighted_percent: f64 },
    /// Trigger ran and the baseline was committed
    Fired { weighted_percent: f64 },
    /// Trigger failed; state kept for a retry
    DispatchFailed { weighted_percent: f64, error: String },
}

/// Owns all mutable monitoring state.
///
/// Every mutation goes through `&mut self` on the owning task, so baseline,
/// session and cooldown need no locks. Status readers get copies through a
/// [`StatusHandle`].
pub struct DriftMonitor {
    config: MonitorConfig,
    builder: SnapshotBuilder,
    baseline: BaselineStore,
    session: ChangeSession,
    gate: TriggerGate,
    dispatcher: Dispatcher,
    status_tx: watch::Sender<StatusReport>,
    scan_timeout: Duration,
    cycles: u64,
    last_error: Option<String>,
}

impl DriftMonitor {
    /// Validate configuration, restore any persisted baseline and build the monitor
    pub fn new(config: MonitorConfig, trigger: Arc<dyn Trigger>) -> Result<Self> {
        config.validate()?;
        let builder = SnapshotBuilder::from_config(&config)?;

        let mut baseline = if config.persist_baseline {
            BaselineStore::persistent(config.baseline_path())
        } else {
            BaselineStore::new()
        };
        if let Err(e) = baseline.restore() {
            warn!("Ignoring persisted baseline ({}); the next scan becomes the baseline", e);
        }

        let gate = TriggerGate::new(config.threshold_percent, config.cooldown())
            .with_last_trigger(baseline.last_trigger_at());
        let dispatcher = Dispatcher::new(trigger, &config.backoff);
        let (status_tx, _) = watch::channel(StatusReport::initial(config.threshold_percent));

        let monitor = Self {
            scan_timeout: config.scan_timeout(),
            config,
            builder,
            baseline,
            session: ChangeSession::new(),
            gate,
            dispatcher,
            status_tx,
            cycles: 0,
            last_error: None,
        };
        monitor.publish(Utc::now());
        Ok(monitor)
    }

    /// Build the monitor with the trigger described in configuration
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        let trigger = trigger::from_config(&config.trigger);
        Self::new(config, trigger)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn baseline(&self) -> Option<Arc<Snapshot>> {
        self.baseline.snapshot()
    }

    pub fn baseline_store(&self) -> &BaselineStore {
        &self.baseline
    }

    pub fn session(&self) -> &ChangeSession {
        &self.session
    }

    pub fn gate(&self) -> &TriggerGate {
        &self.gate
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle::new(self.status_tx.subscribe())
    }

    /// Override the scan bound taken from `scan_timeout_secs`.
    ///
    /// Unlike the configuration value this accepts sub-second and zero bounds.
    pub fn set_scan_timeout(&mut self, timeout: Duration) {
        self.scan_timeout = timeout;
    }

    /// Scan all roots, bounded by the scan timeout
    pub async fn scan(&self) -> std::result::Result<Snapshot, ScanError> {
        let timeout = self.scan_timeout;
        tokio::time::timeout(timeout, self.builder.build())
            .await
            .map_err(|_| ScanError::Timeout(timeout))?
    }

    /// Scan like [`scan`](Self::scan), giving up as soon as `shutdown` fires
    pub async fn scan_until(
        &self,
        shutdown: &mut mpsc::Receiver<()>,
    ) -> std::result::Result<Snapshot, ScanError> {
        tokio::select! {
            biased;
            _ = shutdown.recv() => Err(ScanError::Cancelled),
            result = self.scan() => result,
        }
    }

    /// Run one full cycle now
    pub async fn step(&mut self) -> Result<CycleOutcome> {
        self.step_at(Utc::now()).await
    }

    /// Run one full cycle, evaluating the gate at `now`
    pub async fn step_at(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        match self.scan().await {
            Ok(snapshot) => self.process_at(snapshot, now).await,
            Err(e) => {
                self.record_scan_failure(&e, now);
                Err(e.into())
            }
        }
    }

    /// Diff a finished scan against the baseline and act on the gate decision
    pub async fn process_at(&mut self, snapshot: Snapshot, now: DateTime<Utc>) -> Result<CycleOutcome> {
        self.cycles += 1;
        let current = Arc::new(snapshot);

        let Some(baseline) = self.baseline.snapshot() else {
            info!("First scan becomes the baseline ({} files)", current.len());
            let files = current.len();
            self.last_error =
                self.baseline.commit(current, now, BaselineOrigin::Initial).err().map(|e| e.to_string());
            self.session.reset();
            self.publish(now);
            return Ok(CycleOutcome::BaselineCreated { files });
        };

        let events = diff_snapshots(&baseline, &current, self.config.modified_epsilon);
        self.session.absorb(events);
        let percent = self.session.weighted_percent(baseline.total_weighted_size());
        debug!(
            "Cycle {}: {} outstanding changes, score {:.2} ({:.2}%)",
            self.cycles,
            self.session.events().len(),
            self.session.accumulated_weighted_score(),
            percent
        );

        self.last_error = None;
        let decision = self.gate.evaluate(percent, now, self.dispatcher.ready_at(now))?;
        let outcome = match decision {
            GateDecision::Accumulate if self.session.is_empty() => CycleOutcome::Unchanged,
            GateDecision::Accumulate => CycleOutcome::Accumulating { weighted_percent: percent },
            GateDecision::Defer { remaining } => {
                CycleOutcome::Deferred { weighted_percent: percent, remaining }
            }
            GateDecision::Throttled => CycleOutcome::Throttled { weighted_percent: percent },
            GateDecision::Fire => self.fire(&baseline, current, percent, now).await?,
        };

        self.publish(now);
        Ok(outcome)
    }

    async fn fire(
        &mut self,
        baseline: &Snapshot,
        current: Arc<Snapshot>,
        percent: f64,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let context = TriggerContext::new(
            now,
            baseline.taken_at,
            percent,
            self.session.accumulated_weighted_score(),
            self.session.events().to_vec(),
        );

        match self.dispatcher.dispatch(&context, now).await {
            Ok(()) => {
                if let Err(e) = self.baseline.commit(current, now, BaselineOrigin::Trigger) {
                    self.last_error = Some(e.to_string());
                }
                self.session.reset();
                self.gate.complete_fire(now)?;
                info!("Fired at {:.2}%, baseline committed", percent);
                Ok(CycleOutcome::Fired { weighted_percent: percent })
            }
            Err(e) => {
                self.gate.fail_fire(now)?;
                let error = e.to_string();
                self.last_error = Some(error.clone());
                Ok(CycleOutcome::DispatchFailed { weighted_percent: percent, error })
            }
        }
    }

    /// Commit a fresh scan as the baseline without firing.
    ///
    /// Cooldown timing is left alone. Returns the number of files committed.
    pub async fn rebaseline_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let snapshot = match self.scan().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record_scan_failure(&e, now);
                return Err(e.into());
            }
        };

        let files = snapshot.len();
        info!("Re-baselining with {} files", files);
        let committed = self.baseline.commit(Arc::new(snapshot), now, BaselineOrigin::Rebaseline);
        self.session.reset();
        self.gate.reset(now);
        self.publish(now);
        committed?;
        Ok(files)
    }

    /// Report drift against the baseline using a fresh scan, without changing state
    pub async fn probe_at(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        let current = self.scan().await?;
        let Some(baseline) = self.baseline.snapshot() else {
            return Ok(self.status_at(now));
        };

        let mut session = self.session.clone();
        session.absorb(diff_snapshots(&baseline, &current, self.config.modified_epsilon));
        Ok(self.report_for(&session, now))
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> StatusReport {
        self.report_for(&self.session, now)
    }

    fn report_for(&self, session: &ChangeSession, now: DateTime<Utc>) -> StatusReport {
        let baseline = self.baseline.snapshot();
        let committed_at = self.baseline.committed_at();
        let cooldown = self.gate.cooldown();

        StatusReport {
            state: self.gate.state(),
            baseline_taken_at: baseline.as_ref().map(|b| b.taken_at),
            baseline_committed_at: committed_at,
            baseline_age: committed_at.and_then(|at| (now - at).to_std().ok()),
            baseline_files: baseline.as_ref().map_or(0, |b| b.len()),
            weighted_percent: baseline
                .as_ref()
                .map_or(0.0, |b| session.weighted_percent(b.total_weighted_size())),
            threshold_percent: self.gate.threshold_percent(),
            cooldown_remaining: cooldown.remaining_at(now),
            pending_fire: cooldown.pending_fire,
            added: session.count(ChangeKind::Added),
            modified: session.count(ChangeKind::Modified),
            removed: session.count(ChangeKind::Removed),
            cycles: self.cycles,
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self, now: DateTime<Utc>) {
        self.status_tx.send_replace(self.status_at(now));
    }

    fn record_scan_failure(&mut self, error: &ScanError, now: DateTime<Utc>) {
        self.cycles += 1;
        error!("Cycle {} abandoned: {}", self.cycles, error);
        self.last_error = Some(error.to_string());
        self.publish(now);
    }

    /// Time to wait before the next cycle.
    ///
    /// A pending fire or a dispatch backoff that ends before the next poll
    /// shortens the wait so the fire happens on time.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        let poll = self.config.poll_interval();
        let due = match self.gate.state() {
            GateState::CooldownWait => self.gate.cooldown().remaining_at(now),
            GateState::ThresholdExceeded => self
                .dispatcher
                .backoff()
                .not_before()
                .and_then(|at| (at - now).to_std().ok()),
            _ => None,
        };

        due.map_or(poll, |due| due.min(poll)).max(MIN_DELAY)
    }

    /// Run cycles until a shutdown signal arrives or the sender is dropped.
    ///
    /// A signal during a scan abandons the scan. Once a scan has completed,
    /// the gate decision and any dispatch finish before the loop exits.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            "Starting drift monitor on {:?} (threshold {}%, poll every {:?})",
            self.builder.roots(),
            self.config.threshold_percent,
            self.config.poll_interval()
        );

        loop {
            let scanned = self.scan_until(&mut shutdown).await;
            let now = Utc::now();
            match scanned {
                Ok(snapshot) => match self.process_at(snapshot, now).await {
                    Ok(outcome) => debug!("Cycle {} finished: {:?}", self.cycles, outcome),
                    Err(e) => error!("Cycle {} failed: {}", self.cycles, e),
                },
                Err(ScanError::Cancelled) => {
                    info!("Shutdown requested, abandoning in-flight scan");
                    break;
                }
                Err(e) => self.record_scan_failure(&e, now),
            }

            let delay = self.next_delay(Utc::now());
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Drift monitor stopped after {} cycles", self.cycles);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{FileCategory, FileRecord, LogTrigger};
    use tempfile::TempDir;

    fn monitor_for(dir: &TempDir) -> DriftMonitor {
        let config = MonitorConfig {
            roots: vec![dir.path().to_path_buf()],
            persist_baseline: false,
            ..MonitorConfig::default()
        };
        DriftMonitor::new(config, Arc::new(LogTrigger)).unwrap()
    }

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: path.into(),
            size,
            modified: None,
            category: FileCategory::Other,
            weight: 1.0,
            hash: None,
        }
    }

    #[tokio::test]
    async fn test_first_cycle_creates_baseline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello").unwrap();
        let mut monitor = monitor_for(&dir);

        assert_eq!(monitor.step().await.unwrap(), CycleOutcome::BaselineCreated { files: 1 });
        assert_eq!(monitor.baseline().unwrap().len(), 1);
        assert_eq!(monitor.gate().state(), GateState::Idle);
    }

    #[tokio::test]
    async fn test_process_fires_on_large_drift() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_for(&dir);
        let now = Utc::now();

        monitor.process_at(Snapshot::new(now, vec![record("a", 100)]), now).await.unwrap();
        let outcome = monitor
            .process_at(Snapshot::new(now, vec![record("a", 100), record("b", 50)]), now)
            .await
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Fired { weighted_percent: 50.0 });
        assert_eq!(monitor.baseline().unwrap().len(), 2);
        assert_eq!(monitor.session().accumulated_weighted_score(), 0.0);
    }

    #[tokio::test]
    async fn test_status_handle_tracks_cycles() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_for(&dir);
        let handle = monitor.status_handle();

        monitor.step().await.unwrap();
        monitor.step().await.unwrap();

        let status = handle.current();
        assert_eq!(status.cycles, 2);
        assert_eq!(status.state, GateState::Idle);
        assert!(status.baseline_committed_at.is_some());
    }

    #[tokio::test]
    async fn test_next_delay_shortens_for_pending_fire() {
        let dir = TempDir::new().unwrap();
        let mut config = MonitorConfig {
            roots: vec![dir.path().to_path_buf()],
            persist_baseline: false,
            ..MonitorConfig::default()
        };
        config.cooldown_secs = 60;
        config.poll_interval_secs = 30;
        let mut monitor = DriftMonitor::new(config, Arc::new(LogTrigger)).unwrap();
        let t0 = Utc::now();

        monitor.process_at(Snapshot::new(t0, vec![record("a", 100)]), t0).await.unwrap();
        monitor
            .process_at(Snapshot::new(t0, vec![record("a", 100), record("b", 50)]), t0)
            .await
            .unwrap();
        let later = t0 + chrono::Duration::seconds(50);
        monitor
            .process_at(
                Snapshot::new(later, vec![record("a", 100), record("b", 50), record("c", 100)]),
                later,
            )
            .await
            .unwrap();

        assert_eq!(monitor.gate().state(), GateState::CooldownWait);
        assert_eq!(monitor.next_delay(later), Duration::from_secs(10));
        assert_eq!(monitor.next_delay(t0), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_for(&dir);
        let handle = monitor.status_handle();
        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            monitor.run(rx).await.unwrap();
            monitor
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(()).await.unwrap();

        let monitor = task.await.unwrap();
        assert!(monitor.cycles() >= 1);
        assert!(monitor.baseline().is_some());
        assert!(handle.current().cycles >= 1);
    }
}

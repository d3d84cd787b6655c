//! Trigger collaborator interface and dispatch with backoff

use super::config::{BackoffConfig, TriggerConfig};
use super::diff::{ChangeEvent, ChangeKind};
use super::{TriggerError, to_delta};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default upper bound on a trigger command
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(600);

/// Everything a trigger learns about the fire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerContext {
    pub fired_at: DateTime<Utc>,
    pub baseline_taken_at: DateTime<Utc>,
    pub weighted_percent: f64,
    pub accumulated_weighted_score: f64,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// Outstanding differences from the baseline, in path order
    pub events: Vec<ChangeEvent>,
}

impl TriggerContext {
    pub fn new(
        fired_at: DateTime<Utc>,
        baseline_taken_at: DateTime<Utc>,
        weighted_percent: f64,
        accumulated_weighted_score: f64,
        events: Vec<ChangeEvent>,
    ) -> Self {
        let count = |kind: ChangeKind| events.iter().filter(|e| e.kind == kind).count();
        let (added, modified, removed) =
            (count(ChangeKind::Added), count(ChangeKind::Modified), count(ChangeKind::Removed));

        Self {
            fired_at,
            baseline_taken_at,
            weighted_percent,
            accumulated_weighted_score,
            added,
            modified,
            removed,
            events,
        }
    }
}

/// External action run when accumulated change crosses the threshold
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, context: &TriggerContext) -> Result<(), TriggerError>;
}

/// Build the trigger described by configuration
pub fn from_config(config: &TriggerConfig) -> Arc<dyn Trigger> {
    match config.command.split_first() {
        Some((program, args)) => {
            let timeout =
                config.timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_TRIGGER_TIMEOUT);
            Arc::new(CommandTrigger::new(program.clone(), args.to_vec(), timeout))
        }
        None => Arc::new(LogTrigger),
    }
}

/// Runs a program, feeding it the context as JSON on stdin
pub struct CommandTrigger {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTrigger {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self { program, args, timeout }
    }

    async fn run(&self, context: &TriggerContext) -> Result<(), TriggerError> {
        let payload =
            serde_json::to_vec(context).map_err(|e| TriggerError::Other(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("DRIFT_WATCH_PERCENT", format!("{:.4}", context.weighted_percent))
            .env("DRIFT_WATCH_SCORE", format!("{:.4}", context.accumulated_weighted_score))
            .env("DRIFT_WATCH_ADDED", context.added.to_string())
            .env("DRIFT_WATCH_MODIFIED", context.modified.to_string())
            .env("DRIFT_WATCH_REMOVED", context.removed.to_string())
            .env("DRIFT_WATCH_FIRED_AT", context.fired_at.to_rfc3339())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TriggerError::Spawn(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin closes the pipe early; that is fine
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("Trigger command did not read context: {}", e);
            }
        }

        let output =
            child.wait_with_output().await.map_err(|e| TriggerError::Other(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TriggerError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Trigger for CommandTrigger {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(&self, context: &TriggerContext) -> Result<(), TriggerError> {
        info!("Running trigger command {} {:?}", self.program, self.args);
        tokio::time::timeout(self.timeout, self.run(context))
            .await
            .map_err(|_| TriggerError::Timeout(self.timeout))?
    }
}

/// Logs the fire and always succeeds
pub struct LogTrigger;

#[async_trait]
impl Trigger for LogTrigger {
    fn name(&self) -> &str {
        "log"
    }

    async fn execute(&self, context: &TriggerContext) -> Result<(), TriggerError> {
        info!(
            "Drift threshold fired at {:.2}%: {} added, {} modified, {} removed",
            context.weighted_percent, context.added, context.modified, context.removed
        );
        for event in &context.events {
            debug!("  {} {} ({:.1})", event.kind, event.path, event.magnitude);
        }
        Ok(())
    }
}

/// Exponential delay between failed dispatch attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    failures: u32,
    not_before: Option<DateTime<Utc>>,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.initial_secs),
            multiplier: config.multiplier,
            max: Duration::from_secs(config.max_secs),
            failures: 0,
            not_before: None,
        }
    }

    pub fn ready_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|not_before| now >= not_before)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the delay before the next attempt
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Duration {
        let factor = self.multiplier.powi(self.failures.min(64) as i32);
        let secs = (self.initial.as_secs_f64() * factor).min(self.max.as_secs_f64());
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max);

        self.failures = self.failures.saturating_add(1);
        self.not_before =
            Some(now.checked_add_signed(to_delta(delay)).unwrap_or(DateTime::<Utc>::MAX_UTC));
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.not_before = None;
    }
}

/// Invokes the trigger and tracks dispatch backoff.
///
/// Only the owning loop holds a `&mut Dispatcher`, so dispatches never overlap.
pub struct Dispatcher {
    trigger: Arc<dyn Trigger>,
    backoff: Backoff,
    attempts: u64,
}

impl Dispatcher {
    pub fn new(trigger: Arc<dyn Trigger>, backoff: &BackoffConfig) -> Self {
        Self { trigger, backoff: Backoff::new(backoff), attempts: 0 }
    }

    pub fn ready_at(&self, now: DateTime<Utc>) -> bool {
        self.backoff.ready_at(now)
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub async fn dispatch(
        &mut self,
        context: &TriggerContext,
        now: DateTime<Utc>,
    ) -> Result<(), TriggerError> {
        self.attempts += 1;
        match self.trigger.execute(context).await {
            Ok(()) => {
                info!("Trigger '{}' succeeded", self.trigger.name());
                self.backoff.reset();
                Ok(())
            }
            Err(e) => {
                let delay = self.backoff.record_failure(now);
                warn!(
                    "Trigger '{}' failed (attempt {}): {}; retrying in {:?}",
                    self.trigger.name(),
                    self.backoff.failures(),
                    e,
                    delay
                );
                Err(e)
            }
        }
    }
}

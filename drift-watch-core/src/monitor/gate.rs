//! Threshold and cooldown state machine deciding when to fire

use super::{GateError, to_delta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const MAX_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    Idle,
    ThresholdExceeded,
    Firing,
    CooldownWait,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ThresholdExceeded => write!(f, "ThresholdExceeded"),
            Self::Firing => write!(f, "Firing"),
            Self::CooldownWait => write!(f, "CooldownWait"),
        }
    }
}

/// What the owning loop should do after an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Below threshold, keep scanning
    Accumulate,
    /// Dispatch the trigger now
    Fire,
    /// Threshold exceeded inside the cooldown window
    Defer { remaining: Duration },
    /// Eligible to fire but dispatch is backing off after a failure
    Throttled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownState {
    pub last_trigger_at: Option<DateTime<Utc>>,
    pub cooldown: Duration,
    /// Threshold was exceeded while the cooldown was still running
    pub pending_fire: bool,
}

impl CooldownState {
    pub fn new(cooldown: Duration) -> Self {
        Self { last_trigger_at: None, cooldown, pending_fire: false }
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_trigger_at {
            None => true,
            Some(last) => now - last >= to_delta(self.cooldown),
        }
    }

    /// Time left before another fire is allowed, if any
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_trigger_at?;
        // A cooldown that ends past the representable calendar never ends.
        let Some(ends) = last.checked_add_signed(to_delta(self.cooldown)) else {
            return Some(self.cooldown);
        };
        if now >= ends { None } else { (ends - now).to_std().ok() }
    }
}

#[derive(Debug, Clone)]
struct GateTransition {
    from: GateState,
    to: GateState,
    at: DateTime<Utc>,
}

pub struct TriggerGate {
    state: GateState,
    threshold_percent: f64,
    cooldown: CooldownState,
    history: VecDeque<GateTransition>,
}

impl TriggerGate {
    pub fn new(threshold_percent: f64, cooldown: Duration) -> Self {
        debug!("Initializing gate with threshold {}% and cooldown {:?}", threshold_percent, cooldown);

        Self {
            state: GateState::Idle,
            threshold_percent,
            cooldown: CooldownState::new(cooldown),
            history: VecDeque::new(),
        }
    }

    /// Carry over the time of a fire recorded before a restart
    pub fn with_last_trigger(mut self, last_trigger_at: Option<DateTime<Utc>>) -> Self {
        self.cooldown.last_trigger_at = last_trigger_at;
        self
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Decide what to do with the current weighted percentage.
    ///
    /// `dispatch_ready` is false while the dispatcher is backing off.
    pub fn evaluate(
        &mut self,
        percent: f64,
        now: DateTime<Utc>,
        dispatch_ready: bool,
    ) -> Result<GateDecision, GateError> {
        match self.state {
            GateState::Idle => {
                if percent < self.threshold_percent {
                    return Ok(GateDecision::Accumulate);
                }
                info!(
                    "Weighted change {:.2}% reached threshold {:.2}%",
                    percent, self.threshold_percent
                );
                self.transition_to(GateState::ThresholdExceeded, now)?;
                self.resolve_exceeded(now, dispatch_ready)
            }
            GateState::ThresholdExceeded => self.resolve_exceeded(now, dispatch_ready),
            GateState::CooldownWait => {
                if !self.cooldown.elapsed_at(now) || !self.cooldown.pending_fire {
                    let remaining = self.cooldown.remaining_at(now).unwrap_or_default();
                    return Ok(GateDecision::Defer { remaining });
                }
                if !dispatch_ready {
                    return Ok(GateDecision::Throttled);
                }
                info!("Cooldown elapsed with a pending fire");
                self.begin_fire(now)
            }
            GateState::Firing => {
                Err(GateError { from: GateState::Firing, to: GateState::Firing })
            }
        }
    }

    fn resolve_exceeded(
        &mut self,
        now: DateTime<Utc>,
        dispatch_ready: bool,
    ) -> Result<GateDecision, GateError> {
        if self.cooldown.elapsed_at(now) {
            if !dispatch_ready {
                debug!("Dispatch backing off, holding fire");
                return Ok(GateDecision::Throttled);
            }
            return self.begin_fire(now);
        }

        self.transition_to(GateState::CooldownWait, now)?;
        self.cooldown.pending_fire = true;
        let remaining = self.cooldown.remaining_at(now).unwrap_or_default();
        info!("Threshold exceeded during cooldown, fire pending in {:?}", remaining);
        Ok(GateDecision::Defer { remaining })
    }

    fn begin_fire(&mut self, now: DateTime<Utc>) -> Result<GateDecision, GateError> {
        self.transition_to(GateState::Firing, now)?;
        self.cooldown.pending_fire = false;
        Ok(GateDecision::Fire)
    }

    /// The trigger succeeded and the baseline was committed
    pub fn complete_fire(&mut self, now: DateTime<Utc>) -> Result<(), GateError> {
        self.transition_to(GateState::Idle, now)?;
        self.cooldown.last_trigger_at = Some(now);
        self.cooldown.pending_fire = false;
        Ok(())
    }

    /// The trigger failed; the accumulated score is still unresolved
    pub fn fail_fire(&mut self, now: DateTime<Utc>) -> Result<(), GateError> {
        self.transition_to(GateState::ThresholdExceeded, now)
    }

    /// Return to Idle after an operator re-baseline. Cooldown timing is kept.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        if self.state != GateState::Idle {
            info!("Resetting gate from {} to Idle", self.state);
            self.record(GateState::Idle, now);
            self.state = GateState::Idle;
        }
        self.cooldown.pending_fire = false;
    }

    fn transition_to(&mut self, to: GateState, now: DateTime<Utc>) -> Result<(), GateError> {
        if !Self::is_valid_transition(self.state, to) {
            return Err(GateError { from: self.state, to });
        }

        debug!("Gate transition {} -> {}", self.state, to);
        self.record(to, now);
        self.state = to;
        Ok(())
    }

    fn record(&mut self, to: GateState, at: DateTime<Utc>) {
        self.history.push_back(GateTransition { from: self.state, to, at });
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    fn is_valid_transition(from: GateState, to: GateState) -> bool {
        use GateState::*;

        matches!(
            (from, to),
            (Idle, ThresholdExceeded)
                | (ThresholdExceeded, Firing)
                | (ThresholdExceeded, CooldownWait)
                | (CooldownWait, Firing)
                | (Firing, Idle)
                | (Firing, ThresholdExceeded)
        )
    }

    /// Recent transitions, oldest first
    pub fn transition_history(&self) -> Vec<(GateState, GateState)> {
        self.history.iter().map(|t| (t.from, t.to)).collect()
    }

    pub fn time_in_current_state(&self, now: DateTime<Utc>) -> Duration {
        self.history.back().and_then(|t| (now - t.at).to_std().ok()).unwrap_or_default()
    }
}

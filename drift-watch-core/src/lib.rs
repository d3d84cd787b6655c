//! Core functionality for drift-watch
//!
//! This crate contains the drift monitoring engine: weighted snapshots of
//! file trees, baseline diffing, change accumulation, and the
//! threshold/cooldown gate that decides when to run a trigger.

pub mod monitor;

pub use monitor::{
    ChangeEvent, ChangeKind, ChangeSession, CycleOutcome, DriftMonitor, MonitorConfig,
    MonitorError, Result, Snapshot, StatusReport, Trigger, TriggerContext,
};

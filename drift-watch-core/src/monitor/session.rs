//! Weighted change accumulated since the last committed baseline

use super::diff::{ChangeEvent, ChangeKind};
use std::collections::BTreeMap;
use tracing::trace;

/// Running total of change since the last commit.
///
/// Every cycle diffs against the same baseline, so an unresolved change shows
/// up again each cycle. Contributions are tracked per path and only growth
/// beyond what a path already contributed is added, which keeps the score
/// from double counting and never lets it decrease.
#[derive(Debug, Clone, Default)]
pub struct ChangeSession {
    outstanding: Vec<ChangeEvent>,
    contributions: BTreeMap<String, f64>,
    accumulated_weighted_score: f64,
}

impl ChangeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one cycle's baseline diff into the session.
    ///
    /// Returns the score added by this cycle.
    pub fn absorb(&mut self, events: Vec<ChangeEvent>) -> f64 {
        let mut added = 0.0;
        for event in &events {
            let counted = self.contributions.entry(event.path.clone()).or_insert(0.0);
            if event.magnitude > *counted {
                added += event.magnitude - *counted;
                *counted = event.magnitude;
            }
        }

        if added > 0.0 {
            trace!("Session grew by {:.3}", added);
        }
        self.accumulated_weighted_score += added;
        self.outstanding = events;
        added
    }

    /// Sum of counted magnitudes since the last commit
    pub fn accumulated_weighted_score(&self) -> f64 {
        self.accumulated_weighted_score
    }

    /// Accumulated score as a percentage of `baseline_total`.
    ///
    /// An empty baseline is treated as size 1 so the result stays finite.
    pub fn weighted_percent(&self, baseline_total: f64) -> f64 {
        self.accumulated_weighted_score * 100.0 / baseline_total.max(1.0)
    }

    /// Latest differences from the baseline, in path order
    pub fn events(&self) -> &[ChangeEvent] {
        &self.outstanding
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.outstanding.iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated_weighted_score == 0.0 && self.outstanding.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ChangeKind, path: &str, magnitude: f64) -> ChangeEvent {
        ChangeEvent { kind, path: path.to_string(), weight: 1.0, magnitude }
    }

    #[test]
    fn test_persistent_change_counted_once() {
        let mut session = ChangeSession::new();

        session.absorb(vec![event(ChangeKind::Added, "a.md", 20.0)]);
        session.absorb(vec![event(ChangeKind::Added, "a.md", 20.0)]);
        session.absorb(vec![
            event(ChangeKind::Added, "a.md", 20.0),
            event(ChangeKind::Added, "b.md", 20.0),
        ]);

        assert_eq!(session.accumulated_weighted_score(), 40.0);
        assert_eq!(session.count(ChangeKind::Added), 2);
    }

    #[test]
    fn test_growing_change_adds_only_the_increase() {
        let mut session = ChangeSession::new();

        assert_eq!(session.absorb(vec![event(ChangeKind::Modified, "a.rs", 30.0)]), 30.0);
        assert_eq!(session.absorb(vec![event(ChangeKind::Modified, "a.rs", 50.0)]), 20.0);
        assert_eq!(session.absorb(vec![event(ChangeKind::Modified, "a.rs", 10.0)]), 0.0);

        assert_eq!(session.accumulated_weighted_score(), 50.0);
    }

    #[test]
    fn test_score_never_decreases_when_change_reverts() {
        let mut session = ChangeSession::new();
        session.absorb(vec![event(ChangeKind::Added, "a.md", 20.0)]);
        session.absorb(Vec::new());

        assert_eq!(session.accumulated_weighted_score(), 20.0);
        assert!(session.events().is_empty());
    }

    #[test]
    fn test_percent_guards_empty_baseline() {
        let mut session = ChangeSession::new();
        assert_eq!(session.weighted_percent(0.0), 0.0);

        session.absorb(vec![event(ChangeKind::Added, "a", 100.0)]);
        assert_eq!(session.weighted_percent(1000.0), 10.0);
        assert_eq!(session.weighted_percent(0.0), 10_000.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = ChangeSession::new();
        session.absorb(vec![event(ChangeKind::Removed, "a", 5.0)]);
        session.reset();

        assert!(session.is_empty());
        assert_eq!(session.absorb(vec![event(ChangeKind::Removed, "a", 5.0)]), 5.0);
    }
}

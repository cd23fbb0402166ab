//! Cycle-over-cycle risk deltas.
//!
//! [`DeltaTracker`] remembers the last score seen for every identity and
//! picks the objects whose risk rose and sits at or above the alert threshold.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::risk::ScoredObject;

/// An object selected for alerting in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub identity: String,
    pub name: String,
    /// Current score
    pub score: f64,
    /// Current score minus the previous one (a first sighting counts from 0)
    pub delta: f64,
}

/// Stateful delta computation across polling cycles.
///
/// History grows with every identity seen and is never pruned while the
/// process runs.
#[derive(Debug, Clone)]
pub struct DeltaTracker {
    history: HashMap<String, f64>,
    alert_threshold: f64,
    max_alerts: usize,
}

impl DeltaTracker {
    /// `max_alerts == 0` disables truncation.
    pub fn new(alert_threshold: f64, max_alerts: usize) -> Self {
        Self {
            history: HashMap::new(),
            alert_threshold,
            max_alerts,
        }
    }

    /// Fold a cycle's scores into history and return the alert-worthy deltas.
    pub fn observe(&mut self, objects: &[ScoredObject]) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for object in objects {
            let current = object.risk_score;
            let prior = self.history.insert(object.id().to_string(), current).unwrap_or(0.0);
            let delta = current - prior;

            if delta > 0.0 && current >= self.alert_threshold {
                events.push(AlertEvent {
                    identity: object.id().to_string(),
                    name: object.name().to_string(),
                    score: current,
                    delta,
                });
            }
        }

        events.sort_by(|a, b| {
            b.delta
                .partial_cmp(&a.delta)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then_with(|| a.identity.cmp(&b.identity))
        });

        if self.max_alerts > 0 {
            events.truncate(self.max_alerts);
        }

        events
    }

    /// Last recorded score for an identity.
    pub fn prior(&self, identity: &str) -> Option<f64> {
        self.history.get(identity).copied()
    }

    /// Number of identities tracked.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

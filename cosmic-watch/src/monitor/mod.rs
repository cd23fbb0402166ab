//! Risk monitor engine.
//!
//! One cycle runs fetch → score → anchor → delta → broadcast. All cycle
//! state sits behind a single async mutex so cycles never overlap:
//! [`MonitorEngine::run_cycle_once`] waits for it, [`MonitorEngine::try_run_cycle`]
//! gives up when a cycle is already in flight. The cycle body runs in its own
//! task so a panic is reported as [`CycleError::Panicked`] instead of taking
//! the caller down.

pub mod scheduler;

pub use scheduler::{LoopEvent, LoopState, MonitorLoop};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use cosmic_common::config::{FeedConfig, MonitorConfig};
use cosmic_common::logging::generate_cycle_id;

use crate::anchor::{MessageLog, StoreError, ThreadAnchor, ThreadAnchorer, ThreadMessage, ThreadStore};
use crate::delta::{AlertEvent, DeltaTracker};
use crate::feed::{FeedError, FeedSource, FeedWindow};
use crate::notification::{format_alert_message, BroadcastReport, MessageTransport, Notifier};
use crate::recipients::{RecipientId, RecipientRegistry};
use crate::risk::{RiskScorer, ScoredObject};

// ============================================================================
// Types
// ============================================================================

/// Errors that abort a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Feed fetch failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Cycle task panicked: {0}")]
    Panicked(String),

    #[error("Cycle task cancelled")]
    Cancelled,
}

impl From<CycleError> for cosmic_common::Error {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Feed(e) => Self::External(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records returned by the feed
    pub fetched: usize,
    /// Records that scored at the floor for missing inputs
    pub unscored: usize,
    pub anchors_created: usize,
    pub anchor_failures: usize,
    pub alerts: Vec<AlertEvent>,
    pub delivery: BroadcastReport,
}

/// State owned by the cycle lock.
#[derive(Debug)]
pub struct MonitorState {
    pub tracker: DeltaTracker,
}

impl MonitorState {
    pub fn new(alert_threshold: f64, max_alerts: usize) -> Self {
        Self {
            tracker: DeltaTracker::new(alert_threshold, max_alerts),
        }
    }
}

/// Read-side view published at the end of each cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub tracked_identities: usize,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub feed: Vec<ScoredObject>,
}

/// Engine tuning, taken from configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub window_days: u32,
    pub creation_threshold: f64,
    pub alert_threshold: f64,
    pub max_alerts: usize,
    pub delivery_concurrency: usize,
}

impl MonitorSettings {
    pub fn from_config(feed: &FeedConfig, monitor: &MonitorConfig) -> Self {
        Self {
            window_days: feed.window_days,
            creation_threshold: monitor.creation_threshold,
            alert_threshold: monitor.alert_threshold,
            max_alerts: monitor.max_alerts,
            delivery_concurrency: monitor.delivery_concurrency,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default(), &MonitorConfig::default())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The periodic risk-monitoring and alert engine.
pub struct MonitorEngine {
    feed: Arc<dyn FeedSource>,
    scorer: RiskScorer,
    anchorer: ThreadAnchorer,
    notifier: Notifier,
    recipients: RecipientRegistry,
    threads: Arc<dyn ThreadStore>,
    log: Arc<dyn MessageLog>,
    settings: MonitorSettings,
    state: Arc<Mutex<MonitorState>>,
    snapshot: RwLock<MonitorSnapshot>,
    cycles_failed: AtomicU64,
}

impl MonitorEngine {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        transport: Arc<dyn MessageTransport>,
        threads: Arc<dyn ThreadStore>,
        log: Arc<dyn MessageLog>,
        recipients: RecipientRegistry,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            feed,
            scorer: RiskScorer::default(),
            anchorer: ThreadAnchorer::new(Arc::clone(&threads), Arc::clone(&transport)),
            notifier: Notifier::new(transport, settings.delivery_concurrency),
            recipients,
            threads,
            log,
            state: Arc::new(Mutex::new(MonitorState::new(
                settings.alert_threshold,
                settings.max_alerts,
            ))),
            settings,
            snapshot: RwLock::new(MonitorSnapshot::default()),
            cycles_failed: AtomicU64::new(0),
        }
    }

    /// Replace the default scorer.
    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn recipients(&self) -> &RecipientRegistry {
        &self.recipients
    }

    /// Run one cycle, waiting for any cycle in flight to finish first.
    pub async fn run_cycle_once(self: &Arc<Self>) -> Result<CycleReport, CycleError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        self.spawn_cycle(guard).await
    }

    /// Run one cycle unless another is in flight, in which case `None`.
    pub async fn try_run_cycle(self: &Arc<Self>) -> Option<Result<CycleReport, CycleError>> {
        let guard = Arc::clone(&self.state).try_lock_owned().ok()?;
        Some(self.spawn_cycle(guard).await)
    }

    async fn spawn_cycle(
        self: &Arc<Self>,
        mut guard: OwnedMutexGuard<MonitorState>,
    ) -> Result<CycleReport, CycleError> {
        let engine = Arc::clone(self);
        let cycle_id = generate_cycle_id();

        let task = {
            let cycle_id = cycle_id.clone();
            tokio::spawn(async move { engine.cycle(&mut guard, cycle_id).await })
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(CycleError::Panicked(message))
            }
            Err(_) => Err(CycleError::Cancelled),
        };

        if let Err(ref e) = result {
            self.cycles_failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(cycle_id = %cycle_id, error = %e, "Monitor cycle failed");
            let mut snapshot = self.snapshot.write().await;
            snapshot.cycles_failed = self.cycles_failed.load(Ordering::Relaxed);
            snapshot.last_error = Some(e.to_string());
        }

        result
    }

    async fn cycle(&self, state: &mut MonitorState, cycle_id: String) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let window = FeedWindow::starting_today(self.settings.window_days);
        tracing::debug!(cycle_id = %cycle_id, feed = self.feed.name(), "Monitor cycle started");

        let records = self.feed.fetch(window).await?;
        let fetched = records.len();
        let scored = self.scorer.score_all(records);
        let unscored = scored.iter().filter(|o| o.scoring_gap.is_some()).count();

        let mut anchors_created = 0;
        let mut anchor_failures = 0;
        for object in scored
            .iter()
            .filter(|o| o.risk_score >= self.settings.creation_threshold)
        {
            match self.anchorer.ensure_anchor(object).await {
                Ok(outcome) if outcome.created => anchors_created += 1,
                Ok(_) => {}
                Err(e) => {
                    anchor_failures += 1;
                    tracing::warn!(
                        cycle_id = %cycle_id,
                        identity = %object.id(),
                        error = %e,
                        "Anchor skipped this cycle"
                    );
                }
            }
        }

        let alerts = state.tracker.observe(&scored);

        let delivery = if alerts.is_empty() {
            BroadcastReport::default()
        } else {
            let message = format_alert_message(&alerts);
            self.notifier.broadcast(&message, &self.recipients).await
        };

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            fetched,
            unscored,
            anchors_created,
            anchor_failures,
            alerts,
            delivery,
        };

        tracing::info!(
            cycle_id = %report.cycle_id,
            fetched = report.fetched,
            anchors_created = report.anchors_created,
            alerts = report.alerts.len(),
            delivered = report.delivery.delivered,
            "Monitor cycle complete"
        );

        let mut snapshot = self.snapshot.write().await;
        snapshot.cycles_completed += 1;
        snapshot.tracked_identities = state.tracker.len();
        snapshot.last_report = Some(report.clone());
        snapshot.last_error = None;
        snapshot.feed = scored;

        Ok(report)
    }

    /// Latest published view.
    pub async fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Scored feed from the last successful cycle.
    pub async fn latest_feed(&self) -> Vec<ScoredObject> {
        self.snapshot.read().await.feed.clone()
    }

    pub async fn list_anchors(&self) -> Result<Vec<ThreadAnchor>, StoreError> {
        self.threads.list().await
    }

    /// Delete an anchor and its thread log. Returns whether the anchor existed.
    pub async fn delete_anchor(&self, identity: &str) -> Result<bool, StoreError> {
        let existed = self.threads.delete(identity).await?;
        let removed = self.log.clear(identity).await?;
        if existed {
            tracing::info!(identity = %identity, messages = removed, "Thread anchor deleted");
        }
        Ok(existed)
    }

    /// Thread log for an anchored identity, `None` when no anchor exists.
    pub async fn thread_messages(&self, identity: &str) -> Result<Option<Vec<ThreadMessage>>, StoreError> {
        if !self.threads.exists(identity).await? {
            return Ok(None);
        }
        self.log.messages(identity).await.map(Some)
    }

    pub async fn register_recipient(&self, id: RecipientId) -> bool {
        self.recipients.register(id).await
    }
}

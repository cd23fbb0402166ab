//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use cosmic_watch::anchor::SqliteThreadStore;
use cosmic_watch::feed::{FeedError, FeedSource, FeedWindow, ObjectRecord};
use cosmic_watch::monitor::{MonitorEngine, MonitorSettings};
use cosmic_watch::notification::{DeliveryError, MessageTransport};
use cosmic_watch::recipients::{RecipientId, RecipientRegistry};

// ============================================================================
// Records
// ============================================================================

/// Hazardous 200 m object at 5e6 km: scores 90 at 50 000 km/h.
pub fn hazardous(id: &str) -> ObjectRecord {
    ObjectRecord {
        id: id.to_string(),
        name: format!("({id})"),
        hazardous: true,
        diameter_min_m: Some(100.0),
        diameter_max_m: Some(300.0),
        velocity_kph: Some(50_000.0),
        miss_distance_km: Some(5_000_000.0),
    }
}

/// Harmless 50 m object far away: scores 7.5.
pub fn harmless(id: &str) -> ObjectRecord {
    ObjectRecord {
        id: id.to_string(),
        name: format!("({id})"),
        hazardous: false,
        diameter_min_m: Some(50.0),
        diameter_max_m: Some(50.0),
        velocity_kph: Some(20_000.0),
        miss_distance_km: Some(19_500_000.0),
    }
}

// ============================================================================
// Feed
// ============================================================================

pub enum FeedStep {
    Records(Vec<ObjectRecord>),
    Fail,
    Panic,
}

/// Feed that replays scripted steps, repeating the last one forever.
pub struct ScriptedFeed {
    steps: Mutex<VecDeque<FeedStep>>,
    last: Mutex<Vec<ObjectRecord>>,
    pub calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

/// Holds a fetch open until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedFeed {
    pub fn new(steps: Vec<FeedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(steps: Vec<FeedStep>, gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(steps)
        }
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, _window: FeedWindow) -> Result<Vec<ObjectRecord>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(FeedStep::Records(records)) => {
                *self.last.lock().unwrap() = records.clone();
                Ok(records)
            }
            Some(FeedStep::Fail) => Err(FeedError::Unavailable("HTTP 503".into())),
            Some(FeedStep::Panic) => panic!("feed exploded"),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Transport that records traffic and fails on request.
#[derive(Default)]
pub struct MockTransport {
    pub posts: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(RecipientId, String)>>,
    pub failing_recipients: Mutex<HashSet<RecipientId>>,
    pub fail_posts: AtomicUsize,
    next_handle: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` posts.
    pub fn fail_next_posts(&self, n: usize) {
        self.fail_posts.store(n, Ordering::SeqCst);
    }

    pub fn fail_recipient(&self, id: RecipientId) {
        self.failing_recipients.lock().unwrap().insert(id);
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn sent_to(&self) -> Vec<RecipientId> {
        let mut ids: Vec<RecipientId> = self.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn post(&self, text: &str) -> Result<String, DeliveryError> {
        let remaining = self.fail_posts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_posts.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Transport("connection reset".into()));
        }

        self.posts.lock().unwrap().push(text.to_string());
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 100;
        Ok(handle.to_string())
    }

    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), DeliveryError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if self.failing_recipients.lock().unwrap().contains(&recipient) {
            return Err(DeliveryError::Rejected("Forbidden: bot was blocked by the user".into()));
        }
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct Harness {
    pub engine: Arc<MonitorEngine>,
    pub feed: Arc<ScriptedFeed>,
    pub transport: Arc<MockTransport>,
    pub store: Arc<SqliteThreadStore>,
    pub recipients: RecipientRegistry,
}

pub fn harness(feed: ScriptedFeed) -> Harness {
    harness_with(feed, MonitorSettings::default())
}

pub fn harness_with(feed: ScriptedFeed, settings: MonitorSettings) -> Harness {
    let feed = Arc::new(feed);
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(SqliteThreadStore::in_memory().unwrap());
    let recipients = RecipientRegistry::new();

    let engine = Arc::new(MonitorEngine::new(
        feed.clone(),
        transport.clone(),
        store.clone(),
        store.clone(),
        recipients.clone(),
        settings,
    ));

    Harness {
        engine,
        feed,
        transport,
        store,
        recipients,
    }
}

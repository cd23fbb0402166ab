//! Cosmic Watch Library
//!
//! Periodic near-earth-object risk monitoring. Each cycle fetches the NEO
//! feed, scores every object, opens one discussion thread per object that
//! crosses the creation threshold, and alerts registered recipients about the
//! largest risk increases since the previous cycle.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                  cosmic-watch (Rust Service)                  │
//! │                            :4480                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  MonitorLoop ──▶ MonitorEngine                                │
//! │                   ├─ FeedSource (NeoWs)                       │
//! │                   ├─ RiskScorer                               │
//! │                   ├─ ThreadAnchorer ──▶ ThreadStore (SQLite)  │
//! │                   ├─ DeltaTracker                             │
//! │                   └─ Notifier ──▶ MessageTransport (Telegram) │
//! │  Inbox ◀── UpdateSource (getUpdates) ──▶ RecipientRegistry    │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod anchor;
pub mod delta;
pub mod feed;
pub mod inbox;
pub mod monitor;
pub mod notification;
pub mod recipients;
pub mod risk;
pub mod routes;
pub mod telegram;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use cosmic_common::config::Config;

use crate::anchor::SqliteThreadStore;
use crate::feed::NeoWsFeed;
use crate::inbox::{Inbox, UpdateSource};
use crate::monitor::{MonitorEngine, MonitorLoop, MonitorSettings};
use crate::recipients::RecipientRegistry;
use crate::telegram::TelegramClient;

const MAX_BODY_BYTES: usize = 16 * 1024;

/// Inbound listener wiring
pub struct Listener {
    pub inbox: Arc<Inbox>,
    pub source: Arc<dyn UpdateSource>,
}

/// Monitor service state
pub struct WatchState {
    /// Configuration
    pub config: Config,
    /// Cycle engine
    pub engine: Arc<MonitorEngine>,
    /// Scheduled loop driving the engine
    pub monitor: Arc<MonitorLoop>,
    /// Update listener, absent when listening is disabled
    pub listener: Option<Listener>,
}

impl WatchState {
    /// Wire production components from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let store_path = config.store_path();
        let store = Arc::new(
            SqliteThreadStore::open(&store_path)
                .with_context(|| format!("Failed to open thread store at {}", store_path.display()))?,
        );
        tracing::info!(path = %store_path.display(), "Thread store opened");

        let telegram = Arc::new(TelegramClient::new(&config.telegram));
        let feed = Arc::new(NeoWsFeed::new(&config.feed));
        let recipients = RecipientRegistry::new();

        let engine = Arc::new(MonitorEngine::new(
            feed,
            telegram.clone(),
            store.clone(),
            store.clone(),
            recipients.clone(),
            MonitorSettings::from_config(&config.feed, &config.monitor),
        ));

        let listener = config.telegram.listen.then(|| Listener {
            inbox: Arc::new(Inbox::new(
                telegram.clone(),
                recipients,
                store.clone(),
                store,
            )),
            source: telegram,
        });

        Ok(Self::from_parts(config, engine, listener))
    }

    /// Assemble state from pre-built parts.
    pub fn from_parts(config: Config, engine: Arc<MonitorEngine>, listener: Option<Listener>) -> Self {
        let monitor = Arc::new(MonitorLoop::new(
            Arc::clone(&engine),
            Duration::from_secs(config.monitor.interval_secs),
        ));

        Self {
            config,
            engine,
            monitor,
            listener,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<WatchState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/status", get(routes::get_status))
        .route("/api/v1/cycles", post(routes::run_cycle))
        .route("/api/v1/feed", get(routes::get_feed))
        .route("/api/v1/anchors", get(routes::list_anchors))
        .route(
            "/api/v1/anchors/:identity",
            axum::routing::delete(routes::delete_anchor),
        )
        .route(
            "/api/v1/anchors/:identity/messages",
            get(routes::get_anchor_messages),
        )
        .route("/api/v1/recipients", post(routes::register_recipient))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Main monitor service
pub struct WatchService {
    state: Arc<WatchState>,
}

impl WatchService {
    /// Create the service from configuration
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            state: Arc::new(WatchState::new(config)?),
        })
    }

    pub fn from_state(state: Arc<WatchState>) -> Self {
        Self { state }
    }

    /// Start the loop, the update listener and the HTTP server; return on Ctrl-C
    pub async fn start(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // Start the monitor loop
        let monitor = Arc::clone(&self.state.monitor);
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { monitor.run(rx).await }));

        // Start the update listener
        if let Some(listener) = self.state.listener.as_ref() {
            let inbox = Arc::clone(&listener.inbox);
            let source = Arc::clone(&listener.source);
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { inbox.run(source, rx).await }));
        } else {
            tracing::info!("Update listener disabled");
        }

        let server = &self.state.config.server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", server.host, server.port))?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let app = build_router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            })
            .await?;

        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        tracing::info!("Cosmic Watch stopped");
        Ok(())
    }
}

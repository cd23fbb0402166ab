//! Fixed-interval monitor loop.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::MonitorEngine;

/// Monitor loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Loop not started
    Idle,
    /// Loop running
    Running,
    /// Loop stopped
    Stopped,
}

/// Events emitted by the monitor loop
#[derive(Debug, Clone)]
pub enum LoopEvent {
    Started,
    /// A scheduled cycle finished
    CycleCompleted { cycle_id: String, alerts: usize },
    /// A scheduled tick found a cycle in flight
    CycleSkipped,
    /// A scheduled cycle failed; the loop keeps going
    CycleFailed { message: String },
    Stopped,
}

/// Drives [`MonitorEngine`] on a fixed interval until shutdown.
pub struct MonitorLoop {
    engine: Arc<MonitorEngine>,
    period: Duration,
    state: Arc<RwLock<LoopState>>,
    event_tx: broadcast::Sender<LoopEvent>,
}

impl MonitorLoop {
    pub fn new(engine: Arc<MonitorEngine>, period: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            engine,
            period,
            state: Arc::new(RwLock::new(LoopState::Idle)),
            event_tx,
        }
    }

    /// Subscribe to loop events
    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get_state(&self) -> LoopState {
        *self.state.read().await
    }

    /// Run until `shutdown` turns true. The first cycle starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        *self.state.write().await = LoopState::Running;
        let _ = self.event_tx.send(LoopEvent::Started);
        info!(interval_secs = self.period.as_secs(), "Monitor loop started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let event = match self.engine.try_run_cycle().await {
                        None => {
                            debug!("Cycle in flight, skipping tick");
                            LoopEvent::CycleSkipped
                        }
                        Some(Ok(report)) => LoopEvent::CycleCompleted {
                            cycle_id: report.cycle_id,
                            alerts: report.alerts.len(),
                        },
                        Some(Err(e)) => {
                            warn!(error = %e, "Scheduled cycle failed, retrying next interval");
                            LoopEvent::CycleFailed { message: e.to_string() }
                        }
                    };
                    let _ = self.event_tx.send(event);
                }
            }
        }

        *self.state.write().await = LoopState::Stopped;
        let _ = self.event_tx.send(LoopEvent::Stopped);
        info!("Monitor loop stopped");
    }
}

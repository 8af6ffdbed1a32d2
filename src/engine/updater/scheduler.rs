//! Background update checks
//!
//! The scheduler is owned by the application: it is spawned at startup and
//! stopped through the `CancellationToken` the application cancels on
//! shutdown. With `auto_update` on, available updates are downloaded and
//! staged; applying them stays a caller decision.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::component::ComponentId;
use super::orchestrator::UpdateManager;
use super::state::UpdateStatus;

pub struct UpdateScheduler {
    manager: Arc<UpdateManager>,
    interval: Duration,
}

impl UpdateScheduler {
    pub fn new(manager: Arc<UpdateManager>) -> Self {
        let interval = manager.config().settings().check_interval();
        Self { manager, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Check on every tick until `shutdown` is cancelled. The first check
    /// runs immediately.
    ///
    /// A round still in flight at shutdown is dropped; its partial download
    /// is cleaned up on the next start.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Update scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => break,
                        _ = self.run_once() => {}
                    }
                }
            }
        }

        info!("Update scheduler shutting down");
    }

    /// One round: check everything, then stage available updates when
    /// auto-update is enabled.
    pub async fn run_once(&self) -> BTreeMap<ComponentId, UpdateStatus> {
        let statuses = self.manager.check_all().await;

        if !self.manager.config().snapshot().auto_update {
            return statuses;
        }

        for (id, status) in &statuses {
            if !status.update_available {
                continue;
            }
            let Ok(updater) = self.manager.get(*id) else {
                continue;
            };
            // An older staged release is replaced by the newer one
            if updater.staged_version().as_deref() == Some(status.latest_version.as_str()) {
                continue;
            }

            match updater.stage_release(status).await {
                Ok(_) => info!(
                    component = %id,
                    version = %status.latest_version,
                    "Update staged in background"
                ),
                Err(e) => warn!(component = %id, error = %e, "Background download failed"),
            }
        }

        statuses
    }
}

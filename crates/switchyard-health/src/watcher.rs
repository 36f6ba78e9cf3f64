//! Health watcher — periodic probing on a background task.
//!
//! Each watcher owns a child of the caller's cancellation token, so it
//! stops when the phase ends or when the whole run is cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checker::{HealthProbe, HealthTracker, HealthVerdict};

/// What a watcher saw before it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSummary {
    pub probes: u32,
    pub success_rate: f64,
    pub verdict: HealthVerdict,
}

impl WatchSummary {
    fn from_tracker(tracker: &HealthTracker) -> Self {
        Self {
            probes: tracker.probes(),
            success_rate: tracker.success_rate(),
            verdict: tracker.verdict(),
        }
    }
}

/// Spawns health watchers.
#[derive(Debug, Clone)]
pub struct HealthWatcher {
    interval: Duration,
    failure_threshold: u32,
}

impl HealthWatcher {
    pub fn new(interval: Duration, failure_threshold: u32) -> Self {
        Self {
            interval,
            failure_threshold,
        }
    }

    /// Start probing in the background. Stops on `parent` cancellation,
    /// on [`WatchHandle::stop`], or once the tracker turns unhealthy.
    pub fn start(
        &self,
        label: &str,
        probe: Arc<dyn HealthProbe>,
        parent: &CancellationToken,
    ) -> WatchHandle {
        let token = parent.child_token();
        let (tripped_tx, tripped_rx) = watch::channel(false);
        let interval = self.interval.max(Duration::from_millis(1));
        let threshold = self.failure_threshold;
        let stop = token.clone();
        info!(watch = label, ?interval, "health watch started");
        let label = label.to_string();

        let task = tokio::spawn(async move {
            let mut tracker = HealthTracker::new(threshold);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        debug!(watch = %label, "health watch stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        // A check in flight is abandoned, not recorded.
                        let result = tokio::select! {
                            biased;
                            _ = stop.cancelled() => {
                                debug!(watch = %label, "health watch stopped mid-check");
                                break;
                            }
                            result = probe.probe() => result,
                        };
                        if tracker.record(result) == HealthVerdict::Unhealthy {
                            warn!(watch = %label, probes = tracker.probes(), "health watch tripped");
                            let _ = tripped_tx.send(true);
                            break;
                        }
                    }
                }
            }
            WatchSummary::from_tracker(&tracker)
        });

        WatchHandle {
            token,
            tripped: tripped_rx,
            task,
        }
    }
}

/// A running watcher.
pub struct WatchHandle {
    token: CancellationToken,
    tripped: watch::Receiver<bool>,
    task: JoinHandle<WatchSummary>,
}

impl WatchHandle {
    /// Resolves once the watcher declares the environment unhealthy.
    /// Never resolves if the watcher stops for any other reason.
    pub async fn tripped(&mut self) {
        if self.tripped.wait_for(|t| *t).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Stop the watcher and collect its summary.
    pub async fn stop(self) -> WatchSummary {
        self.token.cancel();
        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "health watch task failed");
                WatchSummary {
                    probes: 0,
                    success_rate: 0.0,
                    verdict: HealthVerdict::Unknown,
                }
            }
        }
    }
}

//! Periodic refresh of running tasks.

use std::sync::Arc;
use std::time::Duration;

use crawldeck_registry::registry::TaskRegistry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Background poller.
///
/// A single long-lived Tokio task that re-fetches the status of every
/// running job each `poll_interval`.
pub struct TaskPoller {
    registry: Arc<TaskRegistry>,
    poll_interval: Duration,
}

impl TaskPoller {
    pub fn new(registry: Arc<TaskRegistry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }

    /// Run until `cancel` is triggered. Returns the number of completed
    /// refresh cycles.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Task poller started",
        );

        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(cycles, "Task poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = self.registry.refresh_running_tasks().await;
                    if !summary.is_clean() {
                        tracing::warn!(failed = summary.failed.len(), "Poll cycle had failures");
                    }
                    cycles += 1;
                }
            }
        }
        cycles
    }
}

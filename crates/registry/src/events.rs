//! Change notifications for registry observers.
//!
//! Backed by a `tokio::sync::broadcast` channel: every subscriber sees
//! every event published after it subscribed. Slow subscribers observe
//! `RecvError::Lagged` rather than blocking the registry.

use crawldeck_core::job::Job;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// The job list was replaced by a server listing.
    JobsReplaced { count: usize },
    /// A job was inserted at the front of the list.
    JobAdded(Job),
    /// A job's fields were merged from a report. Carries the merged record.
    JobUpdated(Job),
    JobRemoved { job_id: String },
    /// The submission draft went back to its defaults.
    FormReset,
}

/// Fan-out publisher owned by the registry.
#[derive(Debug)]
pub struct RegistryEvents {
    sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: RegistryEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RegistryEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

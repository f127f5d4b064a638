//! Channel events and the observer registry that fans them out.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Failures reported through [`ChannelEvent::Error`]. Never returned from
/// the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket handshake could not be completed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A failure on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Something that happened on a [`RealtimeChannel`](crate::channel::RealtimeChannel).
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket is open. The reconnect counter has been reset.
    Connected,
    /// A JSON text frame arrived.
    Message(serde_json::Value),
    /// An open socket closed unexpectedly, or a connect attempt failed
    /// (after the matching `Error`).
    Disconnected,
    Error(ChannelError),
    /// Reconnect attempts are used up; only a manual `connect()` resumes.
    MaxReconnectReached,
}

impl ChannelEvent {
    pub fn kind(&self) -> ChannelEventKind {
        match self {
            ChannelEvent::Connected => ChannelEventKind::Connected,
            ChannelEvent::Message(_) => ChannelEventKind::Message,
            ChannelEvent::Disconnected => ChannelEventKind::Disconnected,
            ChannelEvent::Error(_) => ChannelEventKind::Error,
            ChannelEvent::MaxReconnectReached => ChannelEventKind::MaxReconnectReached,
        }
    }
}

/// Subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    Connected,
    Message,
    Disconnected,
    Error,
    MaxReconnectReached,
}

impl fmt::Display for ChannelEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelEventKind::Connected => "connected",
            ChannelEventKind::Message => "message",
            ChannelEventKind::Disconnected => "disconnected",
            ChannelEventKind::Error => "error",
            ChannelEventKind::MaxReconnectReached => "maxReconnectReached",
        };
        f.write_str(name)
    }
}

pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by `on`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listeners per event kind. Registering the same callback twice
/// yields two registrations with distinct ids.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<ChannelEventKind, Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub fn on(&mut self, kind: ChannelEventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove the registration `id` under `kind`. Returns whether one was found.
    pub fn off(&mut self, kind: ChannelEventKind, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&kind) else {
            return false;
        };
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Total registrations across all kinds.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the listeners for `kind`, in registration order.
    pub fn snapshot(&self, kind: ChannelEventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// Invoke every listener. A panicking listener is logged and skipped.
pub(crate) fn dispatch(listeners: &[Listener], event: &ChannelEvent) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            tracing::error!(event = %event.kind(), "Channel listener panicked");
        }
    }
}

//! The reconnecting WebSocket channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;

use crate::events::{
    dispatch, ChannelError, ChannelEvent, ChannelEventKind, ListenerId, ListenerRegistry,
};
use crate::reconnect::{next_step, ReconnectConfig, ReconnectDecision};
use crate::session::{run_session, SessionEnd};

/// Lifecycle of a [`RealtimeChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never connected, or `disconnect()` was called.
    Idle,
    /// A handshake is in flight.
    Connecting,
    Open,
    /// Waiting out the delay before retry number `attempt`.
    ReconnectWaiting { attempt: u32 },
    /// Retries used up. Only `connect()` leaves this state.
    Exhausted,
}

impl ChannelState {
    /// Whether a driver task currently owns the connection.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ChannelState::Connecting | ChannelState::Open | ChannelState::ReconnectWaiting { .. }
        )
    }
}

/// A single logical WebSocket connection to one URL.
///
/// Cheap to clone; all clones share the same connection and listeners.
/// The connection is driven by a background tokio task started by
/// [`connect`](Self::connect), so a runtime must be available.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    config: ReconnectConfig,
    shared: Mutex<Shared>,
    listeners: Mutex<ListenerRegistry>,
}

struct Shared {
    state: ChannelState,
    reconnect_attempts: u32,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
    /// Bumped on every `connect()`/`disconnect()`; a driver whose
    /// generation is stale must not touch state or emit.
    generation: u64,
}

impl RealtimeChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, ReconnectConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                shared: Mutex::new(Shared {
                    state: ChannelState::Idle,
                    reconnect_attempts: 0,
                    outbound: None,
                    cancel: None,
                    generation: 0,
                }),
                listeners: Mutex::new(ListenerRegistry::default()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.inner.shared).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Retries made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.shared).reconnect_attempts
    }

    /// Open the connection. No-op while a connection is already open or
    /// being established. A failed or timed-out handshake surfaces as
    /// [`ChannelEvent::Error`] followed by [`ChannelEvent::Disconnected`] and
    /// enters the reconnect cycle.
    pub fn connect(&self) {
        let (generation, cancel) = {
            let mut shared = lock(&self.inner.shared);
            if shared.state.is_active() {
                tracing::debug!(url = %self.inner.url, state = ?shared.state, "Channel already active");
                return;
            }
            shared.generation += 1;
            shared.reconnect_attempts = 0;
            shared.state = ChannelState::Connecting;
            let cancel = CancellationToken::new();
            shared.cancel = Some(cancel.clone());
            (shared.generation, cancel)
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drive(generation, cancel).await;
        });
    }

    /// Serialize `payload` as JSON and queue it on the open socket.
    /// Returns `false` (and logs a warning) when not connected.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(url = %self.inner.url, error = %e, "Unserializable channel payload");
                return false;
            }
        };

        let shared = lock(&self.inner.shared);
        match (&shared.state, &shared.outbound) {
            (ChannelState::Open, Some(tx)) => {
                if tx.send(text).is_ok() {
                    true
                } else {
                    tracing::warn!(url = %self.inner.url, "Channel session ended; message dropped");
                    false
                }
            }
            _ => {
                tracing::warn!(url = %self.inner.url, "Channel not connected; message dropped");
                false
            }
        }
    }

    /// Close the connection, cancel any pending reconnect and drop every
    /// listener. No events are emitted for this close.
    pub fn disconnect(&self) {
        {
            let mut shared = lock(&self.inner.shared);
            shared.generation += 1;
            shared.state = ChannelState::Idle;
            shared.reconnect_attempts = 0;
            shared.outbound = None;
            if let Some(cancel) = shared.cancel.take() {
                cancel.cancel();
            }
        }
        lock(&self.inner.listeners).clear();
        tracing::info!(url = %self.inner.url, "Channel disconnected");
    }

    /// Register `listener` for events of `kind`. Listeners run on the
    /// channel's driver task and must not block.
    pub fn on<F>(&self, kind: ChannelEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).on(kind, Arc::new(listener))
    }

    /// Remove one registration. Unknown ids are ignored.
    pub fn off(&self, kind: ChannelEventKind, id: ListenerId) -> bool {
        lock(&self.inner.listeners).off(kind, id)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    /// Connection loop for one `connect()` call. Returns when cancelled,
    /// superseded, or out of retries.
    async fn drive(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        loop {
            let handshake =
                tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str()));
            let connected = tokio::select! {
                _ = cancel.cancelled() => return,
                result = handshake => match result {
                    Ok(Ok((ws, _response))) => Ok(ws),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "handshake timed out after {} ms",
                        self.config.connect_timeout.as_millis()
                    )),
                },
            };

            match connected {
                Ok(ws) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let current = self.update(generation, |shared| {
                        shared.state = ChannelState::Open;
                        shared.reconnect_attempts = 0;
                        shared.outbound = Some(tx);
                    });
                    if !current {
                        return;
                    }
                    tracing::info!(url = %self.url, "Channel connected");
                    self.emit(generation, ChannelEvent::Connected);

                    let end = run_session(ws, rx, &cancel, &self.url, |event| {
                        self.emit(generation, event)
                    })
                    .await;

                    self.update(generation, |shared| shared.outbound = None);
                    if end == SessionEnd::Cancelled {
                        return;
                    }
                    tracing::info!(url = %self.url, "Channel connection lost");
                    self.emit(generation, ChannelEvent::Disconnected);
                }
                Err(reason) => {
                    tracing::warn!(url = %self.url, error = %reason, "Channel connect failed");
                    self.emit(
                        generation,
                        ChannelEvent::Error(ChannelError::Connection(format!(
                            "Failed to connect to {}: {reason}",
                            self.url
                        ))),
                    );
                    self.emit(generation, ChannelEvent::Disconnected);
                }
            }

            let mut decision = ReconnectDecision::Exhausted;
            let current = self.update(generation, |shared| {
                decision = next_step(shared.reconnect_attempts, &self.config);
                shared.state = match decision {
                    ReconnectDecision::Retry { attempt, .. } => {
                        shared.reconnect_attempts = attempt;
                        ChannelState::ReconnectWaiting { attempt }
                    }
                    ReconnectDecision::Exhausted => ChannelState::Exhausted,
                };
            });
            if !current {
                return;
            }

            match decision {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::info!(
                        url = %self.url,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting channel",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if !self.update(generation, |shared| shared.state = ChannelState::Connecting) {
                        return;
                    }
                }
                ReconnectDecision::Exhausted => {
                    tracing::error!(
                        url = %self.url,
                        max_attempts = self.config.max_attempts,
                        "Channel reconnect attempts exhausted",
                    );
                    self.emit(generation, ChannelEvent::MaxReconnectReached);
                    return;
                }
            }
        }
    }

    /// Apply `f` if `generation` is still current. Returns whether it was.
    fn update(&self, generation: u64, f: impl FnOnce(&mut Shared)) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            return false;
        }
        f(&mut shared);
        true
    }

    fn emit(&self, generation: u64, event: ChannelEvent) {
        if lock(&self.shared).generation != generation {
            return;
        }
        let listeners = lock(&self.listeners).snapshot(event.kind());
        dispatch(&listeners, &event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

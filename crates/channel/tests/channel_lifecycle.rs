//! Integration tests for [`RealtimeChannel`] against a local WebSocket
//! acceptor and against a port nobody listens on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crawldeck_channel::channel::{ChannelState, RealtimeChannel};
use crawldeck_channel::events::{ChannelError, ChannelEvent, ChannelEventKind};
use crawldeck_channel::reconnect::ReconnectConfig;

const FAST: ReconnectConfig = ReconnectConfig {
    delay: Duration::from_millis(20),
    max_attempts: 5,
    connect_timeout: Duration::from_secs(2),
};

const HELLO: &str = r#"{"type":"task_update","task_times_id":"abc123","status":"running"}"#;

#[derive(Clone, Copy)]
enum Mode {
    /// Keep the socket open and forward what the client sends.
    Hold,
    /// Send the greeting, then close.
    CloseAfterHello,
}

struct TestServer {
    url: String,
    accepted: Arc<AtomicUsize>,
    inbound: mpsc::UnboundedReceiver<String>,
}

/// Accept WebSocket clients. The first `drop_first` TCP connections are
/// closed before the handshake so the client sees a connect failure.
async fn spawn_server(drop_first: usize, mode: Mode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (inbound_tx, inbound) = mpsc::unbounded_channel();

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            if counter.fetch_add(1, Ordering::SeqCst) < drop_first {
                drop(stream);
                continue;
            }
            let inbound_tx = inbound_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let _ = ws.send(Message::Text(HELLO.into())).await;
                let _ = ws.send(Message::Text("not json".into())).await;
                let _ = ws.send(Message::Binary(vec![1, 2, 3].into())).await;
                if let Mode::CloseAfterHello = mode {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(frame)) = ws.next().await {
                    if let Message::Text(text) = frame {
                        let _ = inbound_tx.send(text.to_string());
                    }
                }
            });
        }
    });

    TestServer {
        url: format!("ws://{addr}/ws"),
        accepted,
        inbound,
    }
}

/// Forward every event to a queue the test can await on.
fn record(channel: &RealtimeChannel) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [
        ChannelEventKind::Connected,
        ChannelEventKind::Message,
        ChannelEventKind::Disconnected,
        ChannelEventKind::Error,
        ChannelEventKind::MaxReconnectReached,
    ] {
        let tx = tx.clone();
        channel.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event queue closed")
}

/// Accept TCP connections and never answer the WebSocket handshake.
async fn spawn_blackhole() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("ws://{addr}/ws")
}

async fn expect_failed_connect(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> String {
    let reason = match next_event(events).await {
        ChannelEvent::Error(ChannelError::Connection(reason)) => reason,
        other => panic!("expected a connection error, got {other:?}"),
    };
    assert_eq!(next_event(events).await, ChannelEvent::Disconnected);
    reason
}

async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn connects_and_delivers_json_messages() {
    let server = spawn_server(0, Mode::Hold).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    channel.connect();

    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert!(channel.is_connected());
    assert_matches!(
        next_event(&mut events).await,
        ChannelEvent::Message(value) if value["task_times_id"] == "abc123"
    );

    // The malformed and binary frames are dropped; nothing else arrives.
    let extra = tokio::time::timeout(Duration::from_millis(150), events.recv()).await;
    assert!(extra.is_err());

    channel.disconnect();
}

#[tokio::test]
async fn send_reaches_the_server_only_while_open() {
    let mut server = spawn_server(0, Mode::Hold).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    assert!(!channel.send(&serde_json::json!({"type": "early"})));

    channel.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);

    assert!(channel.send(&serde_json::json!({"type": "subscribe", "task": "abc123"})));
    let received = tokio::time::timeout(Duration::from_secs(5), server.inbound.recv())
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&received).unwrap();
    assert_eq!(value["type"], "subscribe");

    channel.disconnect();
    assert!(!channel.send(&serde_json::json!({"type": "late"})));
}

#[tokio::test]
async fn overlapping_connect_calls_open_one_socket() {
    let server = spawn_server(0, Mode::Hold).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    channel.connect();
    channel.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    channel.connect();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);

    channel.disconnect();
}

#[tokio::test]
async fn failed_connects_retry_then_reset_counter_on_open() {
    let server = spawn_server(2, Mode::Hold).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    channel.connect();

    expect_failed_connect(&mut events).await;
    expect_failed_connect(&mut events).await;
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert_eq!(channel.reconnect_attempts(), 0);
    assert_eq!(server.accepted.load(Ordering::SeqCst), 3);

    channel.disconnect();
}

#[tokio::test]
async fn unexpected_close_reconnects() {
    let server = spawn_server(0, Mode::CloseAfterHello).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    channel.connect();

    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert_matches!(next_event(&mut events).await, ChannelEvent::Message(_));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnected);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert!(server.accepted.load(Ordering::SeqCst) >= 2);

    channel.disconnect();
}

#[tokio::test]
async fn unreachable_url_exhausts_retries_once() {
    let channel = RealtimeChannel::with_config(closed_port_url().await, FAST);
    let errors = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let exhausted = Arc::new(AtomicUsize::new(0));
    {
        let errors = Arc::clone(&errors);
        channel.on(ChannelEventKind::Error, move |_| {
            errors.fetch_add(1, Ordering::SeqCst);
        });
        let disconnects = Arc::clone(&disconnects);
        channel.on(ChannelEventKind::Disconnected, move |_| {
            disconnects.fetch_add(1, Ordering::SeqCst);
        });
        let exhausted = Arc::clone(&exhausted);
        channel.on(ChannelEventKind::MaxReconnectReached, move |_| {
            exhausted.fetch_add(1, Ordering::SeqCst);
        });
    }

    channel.connect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while channel.state() != ChannelState::Exhausted {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Initial attempt plus five retries.
    assert_eq!(errors.load(Ordering::SeqCst), 6);
    assert_eq!(disconnects.load(Ordering::SeqCst), 6);
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    assert_eq!(channel.reconnect_attempts(), FAST.max_attempts);
    assert_eq!(channel.state(), ChannelState::Exhausted);
}

#[tokio::test]
async fn manual_connect_after_exhaustion_starts_over() {
    let config = ReconnectConfig {
        delay: Duration::from_millis(10),
        max_attempts: 1,
        ..Default::default()
    };
    let channel = RealtimeChannel::with_config(closed_port_url().await, config);
    let mut events = record(&channel);

    channel.connect();
    expect_failed_connect(&mut events).await;
    expect_failed_connect(&mut events).await;
    assert_eq!(next_event(&mut events).await, ChannelEvent::MaxReconnectReached);

    channel.connect();
    expect_failed_connect(&mut events).await;
    expect_failed_connect(&mut events).await;
    assert_eq!(next_event(&mut events).await, ChannelEvent::MaxReconnectReached);
}

#[tokio::test]
async fn stalled_handshake_times_out_into_retries() {
    let config = ReconnectConfig {
        delay: Duration::from_millis(10),
        max_attempts: 1,
        connect_timeout: Duration::from_millis(100),
    };
    let channel = RealtimeChannel::with_config(spawn_blackhole().await, config);
    let mut events = record(&channel);

    channel.connect();
    assert_eq!(channel.state(), ChannelState::Connecting);

    let reason = expect_failed_connect(&mut events).await;
    assert!(reason.contains("timed out"), "{reason}");
    expect_failed_connect(&mut events).await;
    assert_eq!(next_event(&mut events).await, ChannelEvent::MaxReconnectReached);
    assert_eq!(channel.state(), ChannelState::Exhausted);

    // Out of the stuck state, a manual connect is honoured again.
    channel.connect();
    expect_failed_connect(&mut events).await;
    channel.disconnect();
}

#[tokio::test]
async fn disconnect_cancels_pending_reconnect_silently() {
    let config = ReconnectConfig {
        delay: Duration::from_millis(200),
        max_attempts: 5,
        ..Default::default()
    };
    let channel = RealtimeChannel::with_config(closed_port_url().await, config);
    let seen = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        channel.on(ChannelEventKind::Error, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    }

    channel.connect();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !matches!(channel.state(), ChannelState::ReconnectWaiting { .. }) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    channel.disconnect();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(channel.state(), ChannelState::Idle);
    assert_eq!(channel.listener_count(), 0);
}

#[tokio::test]
async fn disconnect_from_open_emits_nothing() {
    let server = spawn_server(0, Mode::Hold).await;
    let channel = RealtimeChannel::with_config(&server.url, FAST);
    let mut events = record(&channel);

    channel.connect();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert_matches!(next_event(&mut events).await, ChannelEvent::Message(_));

    channel.disconnect();

    // Listeners were dropped with the channel's registry; the queue closes.
    let rest = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert_matches!(rest, Ok(None));
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}

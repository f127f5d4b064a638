//! Frame loop for one open connection.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::events::{ChannelError, ChannelEvent};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a session loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The peer closed, the stream ended or a receive/send failed.
    Lost,
    /// `disconnect()` was called.
    Cancelled,
}

/// Pump frames until the connection ends or `cancel` fires.
///
/// Outbound text queued on `outbound` is written in order. Inbound text
/// frames are decoded as JSON and reported as [`ChannelEvent::Message`];
/// undecodable frames are dropped with a warning.
pub(crate) async fn run_session(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
    url: &str,
    emit: impl Fn(ChannelEvent),
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(url, error = %e, "Close frame not delivered");
                }
                return SessionEnd::Cancelled;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(url, error = %e, "WebSocket send error");
                    emit(ChannelEvent::Error(ChannelError::Protocol(e.to_string())));
                    return SessionEnd::Lost;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(value) = decode_frame(&text, url) {
                            emit(ChannelEvent::Message(value));
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!(url, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(url, ?frame, "WebSocket closed by peer");
                        return SessionEnd::Lost;
                    }
                    Some(Err(e)) => {
                        tracing::error!(url, error = %e, "WebSocket receive error");
                        emit(ChannelEvent::Error(ChannelError::Protocol(e.to_string())));
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                }
            }
        }
    }
}

/// Parse a text frame as JSON, logging and discarding anything else.
pub(crate) fn decode_frame(text: &str, url: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(url, error = %e, raw_message = %text, "Failed to parse channel message");
            None
        }
    }
}

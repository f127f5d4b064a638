//! Feed job reports pushed over the realtime channel into the registry.

use std::sync::Arc;

use crawldeck_channel::channel::RealtimeChannel;
use crawldeck_channel::events::{ChannelEvent, ChannelEventKind};
use crawldeck_core::job::JobReport;
use crawldeck_registry::registry::TaskRegistry;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Interpret a channel message as a job report.
///
/// Accepts a bare report object or one wrapped as `{"type": ..., "data":
/// {...}}`. Messages without a `task_times_id` are not reports.
pub fn decode_report(message: &Value) -> Option<JobReport> {
    let body = match message.get("data") {
        Some(data) if data.is_object() => data,
        _ => message,
    };
    if body.get("task_times_id").is_none() {
        return None;
    }
    match serde_json::from_value::<JobReport>(body.clone()) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable job report on channel");
            None
        }
    }
}

/// Forward every report received on `channel` to `registry`.
///
/// Listener callbacks stay non-blocking: they only queue the report, and a
/// spawned task applies it. The task ends once the channel drops its
/// listeners on `disconnect()`.
pub fn forward_reports(channel: &RealtimeChannel, registry: Arc<TaskRegistry>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<JobReport>();

    channel.on(ChannelEventKind::Message, move |event| {
        if let ChannelEvent::Message(value) = event {
            if let Some(report) = decode_report(value) {
                let _ = tx.send(report);
            }
        }
    });

    tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            let applied = registry.apply_report(&report).await;
            tracing::debug!(job_id = ?report.job_id, applied, "Pushed report handled");
        }
        tracing::debug!("Report forwarding stopped");
    })
}

/// Log channel lifecycle events.
pub fn log_lifecycle(channel: &RealtimeChannel) {
    let url = channel.url().to_string();
    channel.on(ChannelEventKind::Connected, {
        let url = url.clone();
        move |_| tracing::info!(url = %url, "Realtime channel connected")
    });
    channel.on(ChannelEventKind::Disconnected, {
        let url = url.clone();
        move |_| tracing::warn!(url = %url, "Realtime channel disconnected")
    });
    channel.on(ChannelEventKind::MaxReconnectReached, move |_| {
        tracing::error!(url = %url, "Realtime channel gave up; relying on polling")
    });
}

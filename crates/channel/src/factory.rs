//! Per-job realtime channels.
//!
//! The job runner does not yet expose per-job log or progress sockets.
//! Callers ask a [`JobChannelFactory`] and must treat `None` as "poll
//! instead".

use crate::channel::RealtimeChannel;

pub trait JobChannelFactory: Send + Sync {
    /// Channel streaming log lines for `job_id`, if the runner offers one.
    fn log_channel(&self, job_id: &str) -> Option<RealtimeChannel>;

    /// Channel streaming progress updates for `job_id`, if available.
    fn progress_channel(&self, job_id: &str) -> Option<RealtimeChannel>;
}

/// Factory for runners without per-job sockets. Always returns `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJobChannels;

impl JobChannelFactory for NoJobChannels {
    fn log_channel(&self, job_id: &str) -> Option<RealtimeChannel> {
        tracing::debug!(job_id, "Log channel not available");
        None
    }

    fn progress_channel(&self, job_id: &str) -> Option<RealtimeChannel> {
        tracing::debug!(job_id, "Progress channel not available");
        None
    }
}

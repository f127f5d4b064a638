//! Fixed-interval, bounded reconnection policy.
//!
//! After an unexpected close (or a failed connect) the channel asks
//! [`next_step`] what to do. Every retry waits the same delay; once
//! `max_attempts` retries have been spent the channel gives up until a
//! manual `connect()`.

use std::time::Duration;

/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Retries allowed before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Bound on a single WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunable parameters for the reconnect strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait before each retry.
    pub delay: Duration,
    /// Retries allowed after a connection is lost. `0` disables reconnects.
    pub max_attempts: u32,
    /// A handshake still pending after this long counts as a failed connect.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make retry number `attempt` (1-based).
    Retry { attempt: u32, delay: Duration },
    /// Out of retries.
    Exhausted,
}

/// Decide what follows a lost connection when `attempts` retries have
/// already been made since the last successful open.
pub fn next_step(attempts: u32, config: &ReconnectConfig) -> ReconnectDecision {
    if attempts < config.max_attempts {
        ReconnectDecision::Retry {
            attempt: attempts + 1,
            delay: config.delay,
        }
    } else {
        ReconnectDecision::Exhausted
    }
}

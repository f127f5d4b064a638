//! Headless task panel: keeps a [`TaskRegistry`] in step with the job
//! runner by polling and, when configured, by listening on the realtime
//! channel.
//!
//! [`TaskRegistry`]: crawldeck_registry::registry::TaskRegistry

pub mod config;
pub mod poller;
pub mod push;

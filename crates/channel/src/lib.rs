//! Resilient realtime channel to the job runner.
//!
//! [`channel::RealtimeChannel`] keeps at most one WebSocket open to a
//! URL, decodes inbound JSON frames, reconnects on a fixed interval up to a
//! bounded number of attempts, and fans [`events::ChannelEvent`]s out to
//! listeners registered per [`events::ChannelEventKind`].

pub mod channel;
pub mod events;
pub mod factory;
pub mod reconnect;
mod session;

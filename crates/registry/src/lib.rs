//! In-memory task registry.
//!
//! [`registry::TaskRegistry`] owns the local job list, the submission
//! draft and the loading flags, drives the [`JobGateway`] and reconciles
//! what the runner reports back into local state. Observers follow changes
//! through [`events::RegistryEvent`]s.
//!
//! [`JobGateway`]: crawldeck_gateway::api::JobGateway

pub mod events;
pub mod loading;
pub mod refresh;
pub mod registry;

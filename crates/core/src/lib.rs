//! Shared model for the crawldeck workspace.
//!
//! Job records, the submission draft, the wire shapes exchanged with the
//! job runner, and the error taxonomy used by the gateway and registry.

pub mod error;
pub mod form;
pub mod job;
pub mod types;

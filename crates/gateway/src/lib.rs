//! HTTP client for the crawl job runner.
//!
//! [`api::HttpJobGateway`] wraps the job endpoints (submit, status, list,
//! delete, health) behind the [`api::JobGateway`] trait;
//! [`records::RecordsGateway`] reads the records the crawls collected.
//! Every failure is normalized to a
//! [`TransportFailure`](crawldeck_core::error::TransportFailure).

pub mod api;
pub mod config;
pub mod error;
mod http;
pub mod records;

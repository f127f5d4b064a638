//! Read access to the records collected by finished crawls.
//!
//! Wraps `GET /sqlite/tables` and `GET /sqlite/data`. Both endpoints answer
//! with a `{success, message, data}` envelope.

use crawldeck_core::error::TransportFailure;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::error::{self, GatewayBuildError};
use crate::http::HttpClient;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// One collected row; columns differ per platform table.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, TransportFailure> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(error::normalize(None, None, self.message.as_deref())),
        }
    }
}

/// Which page of which table to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub table: String,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Restrict to rows produced by one job.
    pub job_id: Option<String>,
}

impl RecordQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            job_id: None,
        }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }

    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// One page of rows plus the unpaged total.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub total: u64,
}

/// HTTP client for the collected-records endpoints.
#[derive(Debug, Clone)]
pub struct RecordsGateway {
    http: HttpClient,
}

impl RecordsGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayBuildError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, GatewayBuildError> {
        Ok(Self {
            http: HttpClient::with_client(client, base_url)?,
        })
    }

    /// Names of the tables that currently hold records.
    pub async fn list_tables(&self) -> Result<Vec<String>, TransportFailure> {
        let request = self.http.request(Method::GET, &["sqlite", "tables"]);
        self.unwrap_envelope(request).await
    }

    pub async fn fetch_page(&self, query: &RecordQuery) -> Result<RecordPage, TransportFailure> {
        let mut params = vec![
            ("table", query.table.clone()),
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(job_id) = &query.job_id {
            params.push(("task_times_id", job_id.clone()));
        }
        let request = self
            .http
            .request(Method::GET, &["sqlite", "data"])
            .query(&params);
        self.unwrap_envelope(request).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportFailure> {
        let envelope: Envelope<T> = self.http.execute(request).await?;
        envelope.into_data()
    }
}

//! REST client for the job runner's crawler endpoints.
//!
//! Wraps `POST /crawler/run`, `POST /crawler/run-async`,
//! `GET /crawler/task/{id}`, `GET /crawler/tasks`, `DELETE /crawler/task/{id}`
//! and `GET /health`. Each call is a single round trip: no retries at this
//! layer.

use async_trait::async_trait;
use crawldeck_core::error::TransportFailure;
use crawldeck_core::form::{CrawlRequest, SubmissionForm};
use crawldeck_core::job::JobReport;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::GatewayConfig;
use crate::error::GatewayBuildError;
use crate::http::HttpClient;

/// Envelope returned by both crawl submission endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Logical outcome. `false` means the runner refused or the crawl failed.
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Crawl output for synchronous runs (stdout/stderr).
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Server-assigned job id, present for async submissions.
    #[serde(default)]
    pub task_times_id: Option<String>,
}

/// Body of `GET /crawler/tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskList {
    #[serde(default, deserialize_with = "skip_bad_reports")]
    pub tasks: Vec<JobReport>,
}

/// Decode list items one by one, dropping any that do not decode.
fn skip_bad_reports<'de, D>(deserializer: D) -> Result<Vec<JobReport>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping undecodable task list item");
                None
            }
        })
        .collect())
}

/// Body of `DELETE /crawler/task/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// The job runner as seen by the task registry.
#[async_trait]
pub trait JobGateway: Send + Sync {
    /// Run a crawl and wait for it to finish.
    async fn submit_sync(&self, form: &SubmissionForm) -> Result<RunResponse, TransportFailure>;

    /// Queue a crawl; the response carries the new job id.
    async fn submit_async(&self, form: &SubmissionForm) -> Result<RunResponse, TransportFailure>;

    async fn get_status(&self, job_id: &str) -> Result<JobReport, TransportFailure>;

    /// Every job the runner knows about in `database` (`sqlite`, `mysql`, `all`).
    async fn list_all(&self, database: &str) -> Result<Vec<JobReport>, TransportFailure>;

    async fn delete(&self, job_id: &str) -> Result<DeleteResponse, TransportFailure>;

    async fn health(&self) -> Result<HealthStatus, TransportFailure>;
}

/// [`JobGateway`] over HTTP using [`reqwest`].
#[derive(Debug, Clone)]
pub struct HttpJobGateway {
    http: HttpClient,
}

impl HttpJobGateway {
    /// Create a gateway with its own connection pool and the configured timeout.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayBuildError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    /// Create a gateway reusing an existing [`reqwest::Client`] (useful for
    /// sharing one pool with [`RecordsGateway`](crate::records::RecordsGateway)).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, GatewayBuildError> {
        Ok(Self {
            http: HttpClient::with_client(client, base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url().as_str()
    }
}

#[async_trait]
impl JobGateway for HttpJobGateway {
    async fn submit_sync(&self, form: &SubmissionForm) -> Result<RunResponse, TransportFailure> {
        let body = CrawlRequest::from(form);
        let request = self.http.request(Method::POST, &["crawler", "run"]).json(&body);
        self.http.execute(request).await
    }

    async fn submit_async(&self, form: &SubmissionForm) -> Result<RunResponse, TransportFailure> {
        let body = CrawlRequest::from(form);
        let request = self
            .http
            .request(Method::POST, &["crawler", "run-async"])
            .json(&body);
        self.http.execute(request).await
    }

    async fn get_status(&self, job_id: &str) -> Result<JobReport, TransportFailure> {
        let request = self.http.request(Method::GET, &["crawler", "task", job_id]);
        self.http.execute(request).await
    }

    async fn list_all(&self, database: &str) -> Result<Vec<JobReport>, TransportFailure> {
        let request = self
            .http
            .request(Method::GET, &["crawler", "tasks"])
            .query(&[("database", database)]);
        let list: TaskList = self.http.execute(request).await?;
        Ok(list.tasks)
    }

    async fn delete(&self, job_id: &str) -> Result<DeleteResponse, TransportFailure> {
        let request = self
            .http
            .request(Method::DELETE, &["crawler", "task", job_id]);
        self.http.execute(request).await
    }

    async fn health(&self) -> Result<HealthStatus, TransportFailure> {
        let request = self.http.request(Method::GET, &["health"]);
        self.http.execute(request).await
    }
}

use std::time::Duration;

/// Default base URL of the job runner's API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:10001/api";

/// Default ceiling for a single request/response round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings shared by every gateway built from it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL every endpoint path is appended to, e.g. `http://host:10001/api`.
    pub base_url: String,
    /// Per-request timeout (default: 30 s).
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

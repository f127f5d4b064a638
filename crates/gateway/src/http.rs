//! Shared request plumbing: endpoint URLs, logging, status checks, JSON
//! decoding.

use crawldeck_core::error::TransportFailure;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::config::GatewayConfig;
use crate::error::{self, GatewayBuildError};

#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    pub(crate) fn new(config: &GatewayConfig) -> Result<Self, GatewayBuildError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, &config.base_url)
    }

    pub(crate) fn with_client(
        client: reqwest::Client,
        base_url: &str,
    ) -> Result<Self, GatewayBuildError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| GatewayBuildError::InvalidBaseUrl(base_url.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request for `base_url/seg1/seg2/...`. Segments are
    /// percent-encoded, so ids cannot escape their path position.
    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        tracing::debug!(method = %method, url = %url, "Request");
        self.client.request(method, url)
    }

    /// Send the request and decode a 2xx JSON body into `T`.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportFailure> {
        let response = request.send().await.map_err(|e| {
            let failure = error::from_reqwest(&e);
            tracing::warn!(error = %e, "Request failed before a response arrived");
            failure
        })?;

        let status = response.status();
        let url = response.url().clone();
        tracing::debug!(status = status.as_u16(), url = %url, "Response");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let failure = error::from_status(status.as_u16(), &body);
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                message = %failure.message,
                "Response error",
            );
            return Err(failure);
        }

        response.json::<T>().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Undecodable response body");
            error::normalize(
                Some(status.as_u16()),
                None,
                Some(&format!("Invalid response body: {e}")),
            )
        })
    }
}

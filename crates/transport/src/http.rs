//! reqwest-backed transport
//!
//! Joins the request path onto the configured API base URL, appends query
//! parameters, serializes the JSON body and returns the upstream response
//! verbatim (including error status codes).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::message::{ApiRequest, ApiResponse};
use crate::Transport;

/// Default per-request timeout, matching the web client's 15 s budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` (e.g. `http://127.0.0.1:8000/api/v1`).
    ///
    /// The base must be an absolute http(s) URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url, timeout)
    }

    /// Create a transport that reuses an existing client (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TransportError::InvalidUrl(format!(
                "base URL must use http or https, got: {base_url}"
            )));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the absolute URL for a request: base + path + query.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let raw = if request.path.starts_with('/') {
            format!("{}{}", self.base_url, request.path)
        } else {
            format!("{}/{}", self.base_url, request.path)
        };
        let mut url =
            Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url_for(request)?;

            let mut builder = self
                .client
                .request(request.method.clone(), url)
                .headers(request.headers.clone())
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(TransportError::from_reqwest)?;

            debug!(
                method = %request.method,
                path = %request.path,
                status = status.as_u16(),
                bytes = body.len(),
                "received API response"
            );

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

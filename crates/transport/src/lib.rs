//! Outbound HTTP seam for the MrDoc API client
//!
//! Defines the `Transport` trait that decouples the authentication pipeline
//! from the network stack. `ReqwestTransport` is the production
//! implementation; tests substitute scripted transports that answer from
//! memory so refresh ordering can be driven deterministically.
//!
//! Requests are plain data (`ApiRequest`) so the pipeline can clone and
//! replay them after a token refresh without touching the network layer.

pub mod error;
pub mod http;
pub mod message;

pub use error::{Result, TransportError};
pub use http::ReqwestTransport;
pub use message::{ApiRequest, ApiResponse};

pub use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};

use std::future::Future;
use std::pin::Pin;

/// Abstraction over "issue one HTTP request against the API".
///
/// Implementations must not interpret status codes: a 401 or 500 is a
/// successful transport round-trip and comes back as `Ok(ApiResponse)`.
/// Only failures to obtain a response at all (connect, timeout, body read)
/// are `TransportError`s.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "scripted")
    fn id(&self) -> &str;

    /// Send the request exactly as described. Headers are forwarded verbatim.
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

//! Error types for transport operations

/// Failures to complete an HTTP round-trip.
///
/// HTTP error statuses are not represented here; they are ordinary responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Map a reqwest error onto the transport taxonomy.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() || e.is_body() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        assert_eq!(
            TransportError::Timeout("after 15s".into()).to_string(),
            "request timed out: after 15s"
        );
        assert!(
            TransportError::InvalidUrl("no scheme".into())
                .to_string()
                .contains("no scheme")
        );
    }

    #[tokio::test]
    async fn connect_failure_maps_to_connect() {
        // Port 9 (discard) on localhost is essentially never listening
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();
        assert!(
            matches!(TransportError::from_reqwest(err), TransportError::Connect(_)),
            "refused connection must map to Connect"
        );
    }
}

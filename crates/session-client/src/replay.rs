//! One-shot request replay
//!
//! A request that got a 401 is re-sent exactly once with the refreshed
//! token. The attempt carries its own `retried` flag, so a second 401 ends
//! the attempt instead of starting another refresh.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use transport::{ApiRequest, ApiResponse, Transport};
use uuid::Uuid;

use crate::authenticator::RequestAuthenticator;
use crate::error::{Error, Result};
use crate::metrics;

/// A request plus its retry bookkeeping.
#[derive(Clone)]
pub struct RequestAttempt {
    id: Uuid,
    request: ApiRequest,
    retried: bool,
    sent_with: Option<String>,
}

impl RequestAttempt {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            retried: false,
            sent_with: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub(crate) fn request_mut(&mut self) -> &mut ApiRequest {
        &mut self.request
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Access token the last send carried, if any.
    pub fn sent_with(&self) -> Option<&str> {
        self.sent_with.as_deref()
    }

    pub(crate) fn record_sent_with(&mut self, token: Option<String>) {
        self.sent_with = token;
    }

    /// Flag the attempt as already replayed. A 401 on it is final.
    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    pub fn into_request(self) -> ApiRequest {
        self.request
    }
}

impl fmt::Debug for RequestAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAttempt")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("retried", &self.retried)
            .field("sent_with", &self.sent_with.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Re-sends a failed attempt with an explicit token.
#[derive(Clone)]
pub struct Replayer {
    transport: Arc<dyn Transport>,
    authenticator: RequestAuthenticator,
}

impl Replayer {
    pub fn new(transport: Arc<dyn Transport>, authenticator: RequestAuthenticator) -> Self {
        Self {
            transport,
            authenticator,
        }
    }

    /// Send `attempt` again with `token`, keeping its method, path, query and body.
    ///
    /// Errors with `Unauthenticated` without a token, and with
    /// `RetryExhausted` if the attempt was already replayed or the replay
    /// itself gets a 401.
    pub async fn replay(&self, mut attempt: RequestAttempt, token: Option<String>) -> Result<ApiResponse> {
        let Some(token) = token else {
            return Err(Error::Unauthenticated);
        };
        if attempt.is_retried() {
            metrics::record_replay("exhausted");
            return Err(Error::RetryExhausted {
                status: transport::StatusCode::UNAUTHORIZED,
                body: String::from("request was already replayed"),
            });
        }

        attempt.mark_retried();
        if !self.authenticator.authenticate_with(attempt.request_mut(), &token) {
            return Err(Error::Unauthenticated);
        }
        attempt.record_sent_with(Some(token));

        debug!(request_id = %attempt.id(), "replaying request with refreshed token");
        let response = match self.transport.send(attempt.request()).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_replay("transport_error");
                return Err(e.into());
            }
        };

        if response.is_unauthorized() {
            metrics::record_replay("exhausted");
            warn!(request_id = %attempt.id(), "replayed request rejected again");
            return Err(Error::RetryExhausted {
                status: response.status,
                body: response.text(),
            });
        }

        metrics::record_replay("success");
        Ok(response)
    }
}

//! Outbound request authentication
//!
//! Stamps every request with `API-Version: 1.0` and, when the credential
//! source holds an access token, `Authorization: Bearer <access>`. Never
//! blocks and never fails: a missing token just means the request goes out
//! unauthenticated and the server decides.

use std::sync::Arc;

use session_auth::{CredentialSource, insert_api_version};
use transport::header::AUTHORIZATION;
use transport::{ApiRequest, HeaderMap, HeaderValue};
use tracing::warn;

#[derive(Clone)]
pub struct RequestAuthenticator {
    credentials: Arc<dyn CredentialSource>,
}

impl RequestAuthenticator {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self { credentials }
    }

    /// Attach the current credentials to `request`.
    ///
    /// Returns the access token that was attached, if any. The pipeline keeps
    /// it to tell a stale 401 (token already replaced) from a fresh one.
    pub fn authenticate(&self, request: &mut ApiRequest) -> Option<String> {
        insert_api_version(&mut request.headers);
        match self.credentials.tokens().access {
            Some(access) if set_bearer(&mut request.headers, &access) => Some(access),
            _ => {
                request.headers.remove(AUTHORIZATION);
                None
            }
        }
    }

    /// Attach an explicit access token instead of reading the credential source.
    pub fn authenticate_with(&self, request: &mut ApiRequest, access: &str) -> bool {
        insert_api_version(&mut request.headers);
        set_bearer(&mut request.headers, access)
    }
}

/// Overwrite the Authorization header. Returns false (header removed) when
/// the token is not a valid header value.
fn set_bearer(headers: &mut HeaderMap, access: &str) -> bool {
    match HeaderValue::from_str(&format!("Bearer {access}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            true
        }
        Err(e) => {
            warn!(error = %e, "access token is not a valid header value, sending unauthenticated");
            headers.remove(AUTHORIZATION);
            false
        }
    }
}

//! Token endpoint calls
//!
//! Handles the two token endpoint interactions:
//! 1. Username/password login (`POST /auth/login/`)
//! 2. Token refresh (`POST /auth/refresh/`)
//!
//! Both go straight to the transport with only the API version header set.
//! They never carry an Authorization header and never pass through the
//! refresh-on-401 pipeline, so a rejected refresh cannot trigger another one.

use transport::{ApiRequest, ApiResponse, HeaderMap, HeaderName, HeaderValue, Transport};

use crate::constants::{API_VERSION, API_VERSION_HEADER, LOGIN_PATH, REFRESH_PATH};
use crate::envelope::{Envelope, EnvelopeHead, LoginRequest, LoginResult, RefreshRequest, RefreshResult};
use crate::error::{Error, Result};

/// Set `API-Version: 1.0`, replacing any existing value.
pub fn insert_api_version(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(API_VERSION_HEADER),
        HeaderValue::from_static(API_VERSION),
    );
}

/// Exchange a refresh token for a new access token.
///
/// Any non-2xx status, non-zero envelope code or malformed body is an error.
/// 400/401/403 mean the refresh token itself is invalid or expired.
pub async fn refresh_access_token(transport: &dyn Transport, refresh: &str) -> Result<RefreshResult> {
    let body = serde_json::to_value(RefreshRequest { refresh })
        .map_err(|e| Error::TokenRefresh(format!("encoding refresh request: {e}")))?;
    let mut request = ApiRequest::post(REFRESH_PATH).json(body);
    insert_api_version(&mut request.headers);

    let response = transport.send(&request).await?;

    let status = response.status;
    if !status.is_success() {
        let msg = error_message(&response);
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {msg}"
            )));
        }
        return Err(Error::TokenRefresh(format!(
            "refresh endpoint returned {status}: {msg}"
        )));
    }

    let envelope: Envelope<RefreshResult> = response
        .json()
        .map_err(|e| Error::TokenRefresh(format!("invalid refresh response: {e}")))?;
    if !envelope.is_ok() {
        return Err(Error::TokenRefresh(format!(
            "refresh rejected (code {}): {}",
            envelope.code, envelope.msg
        )));
    }
    Ok(envelope.data)
}

/// Log in with username and password, returning both tokens and the user.
pub async fn login(transport: &dyn Transport, credentials: &LoginRequest) -> Result<LoginResult> {
    let mut request = ApiRequest::post(LOGIN_PATH).json(credentials.to_json());
    insert_api_version(&mut request.headers);

    let response = transport.send(&request).await?;

    if !response.is_success() {
        return Err(Error::InvalidCredentials(format!(
            "login rejected ({}): {}",
            response.status,
            error_message(&response)
        )));
    }

    let envelope: Envelope<LoginResult> = response
        .json()
        .map_err(|e| Error::InvalidCredentials(format!("invalid login response: {e}")))?;
    if !envelope.is_ok() {
        return Err(Error::InvalidCredentials(format!(
            "login rejected (code {}): {}",
            envelope.code, envelope.msg
        )));
    }
    Ok(envelope.data)
}

/// Best-effort `msg` from an error envelope, falling back to the raw body.
fn error_message(response: &ApiResponse) -> String {
    match response.json::<EnvelopeHead>() {
        Ok(head) if !head.msg.is_empty() => head.msg,
        _ => {
            let text = response.text();
            if text.is_empty() {
                String::from("<no body>")
            } else {
                text
            }
        }
    }
}

//! Error types for the authenticated request pipeline

use transport::{StatusCode, TransportError};

/// Errors surfaced to callers of `ApiClient`.
///
/// Non-401 HTTP statuses are not errors at the pipeline level: `send`
/// returns them as ordinary responses. Only the typed helpers turn a
/// failed envelope into `Api`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network-level failure, passed through unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Got a 401 and there is no refresh token to recover with.
    #[error("authentication required: no refresh token available")]
    RefreshTokenMissing,

    /// The refresh endpoint rejected the refresh token or was unreachable.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The replayed request was rejected again after a refresh.
    #[error("still unauthorized after token refresh ({status}): {body}")]
    RetryExhausted { status: StatusCode, body: String },

    /// Replay was requested without a token to replay with.
    #[error("not authenticated")]
    Unauthenticated,

    /// Too many callers already waiting on the in-flight refresh.
    #[error("refresh wait queue full ({0} waiters)")]
    WaitQueueFull(usize),

    /// Non-success status or non-zero envelope code from a typed helper.
    #[error("API error ({status}, code {code}): {msg}")]
    Api {
        status: StatusCode,
        code: i64,
        msg: String,
    },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("credential error: {0}")]
    Credential(#[from] session_auth::Error),
}

impl Error {
    /// Whether this error ended (or requires ending) the session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::RefreshTokenMissing
                | Error::RefreshFailed(_)
                | Error::RetryExhausted { .. }
                | Error::Unauthenticated
        )
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

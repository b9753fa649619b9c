//! Credential source and session hook contracts
//!
//! `TokenBundle` is the access/refresh pair the client authenticates with.
//! The pipeline only ever reads it through `CredentialSource::tokens` and
//! writes it through `CredentialSource::update_tokens` (merge semantics), so
//! whoever owns persistence stays the single source of truth.
//!
//! `SessionHook` is the collaborator's "session is over" callback. Any
//! `Fn()` closure qualifies.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Access/refresh token pair. Either may be absent (unauthenticated state).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl TokenBundle {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    /// Partial update carrying only a new access token.
    pub fn access_only(access: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }

    /// Overwrite only the fields present in `partial`.
    pub fn merge(&mut self, partial: TokenBundle) {
        if let Some(access) = partial.access {
            self.access = Some(access);
        }
        if let Some(refresh) = partial.refresh {
            self.refresh = Some(refresh);
        }
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("TokenBundle")
            .field("access", &redact(&self.access))
            .field("refresh", &redact(&self.refresh))
            .finish()
    }
}

/// Source of truth for the current tokens.
///
/// `tokens` is synchronous and must not block: the refresh coordinator reads
/// it inside its state lock. Updates may persist and are therefore async.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn CredentialSource>`).
pub trait CredentialSource: Send + Sync {
    /// Snapshot of the current tokens.
    fn tokens(&self) -> TokenBundle;

    /// Merge `partial` into the current tokens. Absent fields are left untouched.
    fn update_tokens(&self, partial: TokenBundle)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Drop both tokens.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Collaborator callback fired when the session cannot be recovered.
pub trait SessionHook: Send + Sync {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<F> SessionHook for F
where
    F: Fn() + Send + Sync,
{
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self();
        Box::pin(async {})
    }
}

/// Session hook that clears a credential source.
///
/// The default hook when the collaborator does not supply one.
pub struct ClearOnLogout {
    credentials: Arc<dyn CredentialSource>,
}

impl ClearOnLogout {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self { credentials }
    }
}

impl SessionHook for ClearOnLogout {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = self.credentials.clear().await {
                warn!(error = %e, "failed to clear credentials on logout");
            } else {
                info!("credentials cleared on logout");
            }
        })
    }
}

/// In-memory credential source, e.g. for short-lived tools and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<TokenBundle>,
}

impl MemoryCredentialStore {
    pub fn new(tokens: TokenBundle) -> Self {
        Self {
            state: RwLock::new(tokens),
        }
    }
}

impl CredentialSource for MemoryCredentialStore {
    fn tokens(&self) -> TokenBundle {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_tokens(
        &self,
        partial: TokenBundle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(partial);
        debug!("updated in-memory tokens");
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = TokenBundle::default();
        Box::pin(async { Ok(()) })
    }
}

impl SessionHook for MemoryCredentialStore {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = TokenBundle::default();
        Box::pin(async {})
    }
}

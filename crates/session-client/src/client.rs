//! Authenticated API client
//!
//! `send` is the full pipeline: attach credentials, dispatch, and on a 401
//! go through the refresh coordinator and replay once. Everything that is
//! not a 401 (including 5xx) is handed back untouched.

use std::sync::Arc;

use common::Secret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{
    ClearOnLogout, CredentialSource, Envelope, EnvelopeHead, LoginRequest, ME_PATH, REFRESH_PATH,
    SessionHook, TokenBundle, UserBrief,
};
use tracing::{debug, info, instrument, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::authenticator::RequestAuthenticator;
use crate::coordinator::{RefreshCoordinator, RefreshSettings};
use crate::error::{Error, Result};
use crate::replay::{Replayer, RequestAttempt};

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    hook: Option<Arc<dyn SessionHook>>,
    settings: RefreshSettings,
}

impl ApiClientBuilder {
    /// Hook run when the session cannot be recovered. Defaults to clearing
    /// the credential source.
    pub fn session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn refresh_settings(mut self, settings: RefreshSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ApiClient {
        let hook: Arc<dyn SessionHook> = match self.hook {
            Some(hook) => hook,
            None => Arc::new(ClearOnLogout::new(self.credentials.clone())),
        };
        let authenticator = RequestAuthenticator::new(self.credentials.clone());
        let coordinator = RefreshCoordinator::new(
            self.transport.clone(),
            self.credentials.clone(),
            hook,
            self.settings,
        );
        let replayer = Replayer::new(self.transport.clone(), authenticator.clone());
        ApiClient {
            transport: self.transport,
            credentials: self.credentials,
            authenticator,
            coordinator,
            replayer,
        }
    }
}

/// Client that authenticates every request and recovers from expired
/// access tokens. Clones share one coordinator.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    authenticator: RequestAuthenticator,
    coordinator: RefreshCoordinator,
    replayer: Replayer,
}

impl ApiClient {
    pub fn builder(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> ApiClientBuilder {
        ApiClientBuilder {
            transport,
            credentials,
            hook: None,
            settings: RefreshSettings::default(),
        }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    /// Send a request through the authenticated pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.send_attempt(RequestAttempt::new(request)).await
    }

    /// Send a prepared attempt. An attempt already marked retried is never
    /// refreshed for; its 401 becomes `RetryExhausted`.
    #[instrument(
        skip_all,
        fields(
            request_id = %attempt.id(),
            method = %attempt.request().method,
            path = %attempt.request().path,
        )
    )]
    pub async fn send_attempt(&self, mut attempt: RequestAttempt) -> Result<ApiResponse> {
        let sent_with = self.authenticator.authenticate(attempt.request_mut());
        attempt.record_sent_with(sent_with);

        let response = self.transport.send(attempt.request()).await?;
        if !response.is_unauthorized() || attempt.request().targets(REFRESH_PATH) {
            debug!(status = %response.status, "request completed");
            return Ok(response);
        }

        if attempt.is_retried() {
            warn!("retried request rejected again");
            return Err(Error::RetryExhausted {
                status: response.status,
                body: response.text(),
            });
        }

        debug!(authenticated = attempt.sent_with().is_some(), "received 401, recovering session");
        let token = self.coordinator.acquire_token(attempt.sent_with()).await?;
        self.replayer.replay(attempt, Some(token)).await
    }

    /// Send `request` and decode the `data` of a successful envelope.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        decode_envelope(&response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(ApiRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.call(ApiRequest::post(path).json(encode_body(body)?)).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.call(ApiRequest::put(path).json(encode_body(body)?)).await
    }

    /// Log in with username and password and store both tokens.
    pub async fn login(&self, username: &str, password: Secret<String>) -> Result<UserBrief> {
        let request = LoginRequest {
            username: username.to_string(),
            password,
        };
        let result = session_auth::login(self.transport.as_ref(), &request).await?;
        self.credentials
            .update_tokens(TokenBundle::new(result.access, result.refresh))
            .await?;
        info!(user = %result.user.username, "logged in");
        Ok(result.user)
    }

    /// Current user (`GET /users/me/`).
    pub async fn me(&self) -> Result<UserBrief> {
        self.get_json(ME_PATH).await
    }

    /// End the session: run the session hook, then clear whatever tokens
    /// the hook left behind. A refresh still in flight is discarded. Purely
    /// local; the server keeps no session.
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.logout().await;
        if !self.credentials.tokens().is_empty() {
            self.credentials.clear().await?;
        }
        info!("logged out, credentials cleared");
        Ok(())
    }
}

fn encode_body<B: Serialize>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| Error::Decode(format!("encoding request body: {e}")))
}

/// Unwrap `data` from a success envelope, or map the failure to `Error::Api`.
fn decode_envelope<T: DeserializeOwned>(response: &ApiResponse) -> Result<T> {
    if !response.is_success() {
        let (code, msg) = match response.json::<EnvelopeHead>() {
            Ok(head) => (head.code, head.msg),
            Err(_) => (i64::from(response.status.as_u16()), response.text()),
        };
        return Err(Error::Api {
            status: response.status,
            code,
            msg,
        });
    }

    let head: EnvelopeHead = response
        .json()
        .map_err(|e| Error::Decode(e.to_string()))?;
    if head.code != session_auth::CODE_OK {
        return Err(Error::Api {
            status: response.status,
            code: head.code,
            msg: head.msg,
        });
    }

    let envelope: Envelope<T> = response
        .json()
        .map_err(|e| Error::Decode(e.to_string()))?;
    Ok(envelope.data)
}

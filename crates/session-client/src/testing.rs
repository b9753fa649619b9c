//! Scripted in-memory API for unit tests.
//!
//! Accepts exactly one access token at a time. The refresh endpoint can be
//! held closed until the test has lined up its waiters, which makes the
//! refresh ordering deterministic.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use session_auth::{ClearOnLogout, LOGIN_PATH, ME_PATH, REFRESH_PATH, SessionHook};
use tokio::sync::Semaphore;
use transport::header::AUTHORIZATION;
use transport::{ApiRequest, ApiResponse, StatusCode, Transport, TransportError};

#[derive(Debug, Clone)]
pub(crate) enum RefreshReply {
    Grant {
        access: String,
        refresh: Option<String>,
    },
    Reject(u16),
    Hang,
}

struct ScriptState {
    valid_access: Option<String>,
    refresh_reply: RefreshReply,
    gated: bool,
    seen: Vec<ApiRequest>,
}

pub(crate) struct ScriptedApi {
    state: Mutex<ScriptState>,
    gate: Arc<Semaphore>,
    refresh_calls: AtomicUsize,
}

impl ScriptedApi {
    /// Server that rejects every token until a refresh grants `granted`.
    pub(crate) fn new(granted: &str) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                valid_access: Some("a1-server-side-expired".into()),
                refresh_reply: RefreshReply::Grant {
                    access: granted.into(),
                    refresh: None,
                },
                gated: false,
                seen: Vec::new(),
            }),
            gate: Arc::new(Semaphore::new(0)),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_valid_access(&self, access: Option<&str>) {
        self.state.lock().unwrap().valid_access = access.map(str::to_string);
    }

    pub(crate) fn set_refresh_reply(&self, reply: RefreshReply) {
        self.state.lock().unwrap().refresh_reply = reply;
    }

    /// Park refresh calls until `release_refresh`.
    pub(crate) fn hold_refresh(&self) {
        self.state.lock().unwrap().gated = true;
    }

    pub(crate) fn release_refresh(&self) {
        self.gate.add_permits(1024);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Authorization header values of every non-refresh request, in arrival order.
    pub(crate) fn authorizations(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .unwrap()
            .seen
            .iter()
            .filter(|r| !r.targets(REFRESH_PATH))
            .map(|r| {
                r.headers
                    .get(AUTHORIZATION)
                    .map(|v| v.to_str().unwrap().to_string())
            })
            .collect()
    }

    pub(crate) fn seen(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().seen.clone()
    }

    async fn refresh(&self) -> transport::Result<ApiResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let gated = self.state.lock().unwrap().gated;
        if gated {
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
        }
        let reply = self.state.lock().unwrap().refresh_reply.clone();
        match reply {
            RefreshReply::Grant { access, refresh } => {
                self.state.lock().unwrap().valid_access = Some(access.clone());
                let mut data = serde_json::json!({ "access": access });
                if let Some(refresh) = refresh {
                    data["refresh"] = serde_json::Value::String(refresh);
                }
                Ok(envelope(200, 0, data, "ok"))
            }
            RefreshReply::Reject(status) => Ok(envelope(
                status,
                1,
                serde_json::json!({"detail": "Token is invalid or expired"}),
                "Invalid refresh token",
            )),
            RefreshReply::Hang => std::future::pending().await,
        }
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let password = request
            .body
            .as_ref()
            .and_then(|b| b["password"].as_str())
            .unwrap_or_default();
        if password != "pw" {
            return envelope(400, 1, serde_json::json!({}), "Invalid credentials or token");
        }
        self.state.lock().unwrap().valid_access = Some("login-access".into());
        envelope(
            200,
            0,
            serde_json::json!({
                "refresh": "login-refresh",
                "access": "login-access",
                "user": {"id": 1, "username": "admin", "is_superuser": true, "is_staff": true}
            }),
            "ok",
        )
    }

    fn resource(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        match request.path.as_str() {
            "/down/" => return Err(TransportError::Timeout("scripted timeout".into())),
            "/boom/" => {
                return Ok(envelope(500, 1, serde_json::Value::Null, "server error"));
            }
            _ => {}
        }
        let valid = self.state.lock().unwrap().valid_access.clone();
        let presented = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let authorized = match (&valid, &presented) {
            (Some(valid), Some(presented)) => *presented == format!("Bearer {valid}"),
            _ => false,
        };
        if !authorized || request.path == "/always-401/" {
            return Ok(envelope(
                401,
                401,
                serde_json::json!({"detail": "Given token not valid for any token type"}),
                "unauthorized",
            ));
        }
        if request.targets(ME_PATH) {
            return Ok(envelope(
                200,
                0,
                serde_json::json!({"id": 1, "username": "admin", "is_superuser": true, "is_staff": true}),
                "ok",
            ));
        }
        Ok(envelope(
            200,
            0,
            serde_json::json!({
                "path": request.path,
                "method": request.method.as_str(),
                "query": request.query,
                "body": request.body,
            }),
            "ok",
        ))
    }
}

impl Transport for ScriptedApi {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        self.state.lock().unwrap().seen.push(request.clone());
        Box::pin(async move {
            // Let concurrently spawned callers interleave like real network I/O
            tokio::task::yield_now().await;
            if request.targets(REFRESH_PATH) {
                self.refresh().await
            } else if request.targets(LOGIN_PATH) {
                Ok(self.login(request))
            } else {
                self.resource(request)
            }
        })
    }
}

fn envelope(status: u16, code: i64, data: serde_json::Value, msg: &str) -> ApiResponse {
    ApiResponse::from_json(
        StatusCode::from_u16(status).unwrap(),
        &serde_json::json!({"code": code, "data": data, "msg": msg}),
    )
}

/// Logout hook that counts invocations and clears the store.
pub(crate) struct CountingHook {
    calls: Arc<AtomicUsize>,
    clear: ClearOnLogout,
}

impl CountingHook {
    pub(crate) fn new(calls: Arc<AtomicUsize>, clear: ClearOnLogout) -> Self {
        Self { calls, clear }
    }
}

impl SessionHook for CountingHook {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.clear.on_logout()
    }
}

//! Response envelope and auth payload types
//!
//! Every API v1 endpoint answers `{ "code": int, "data": T, "msg": string }`
//! with `code == 0` on success. Error envelopes carry a detail object in
//! `data`, so the error path decodes `data` as an opaque JSON value.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::CODE_OK;

/// Common response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub data: T,
    #[serde(default)]
    pub msg: String,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Envelope shape used when only `code` and `msg` matter (error bodies).
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeHead {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

/// Body of `POST /auth/refresh/`.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// `data` of a successful refresh. `refresh` is present only when the
/// server rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResult {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Body of `POST /auth/login/`.
#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.username,
            "password": self.password.expose(),
        })
    }
}

/// `data` of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub refresh: String,
    pub access: String,
    pub user: UserBrief,
}

/// Authenticated user summary (`/users/me/` and login).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBrief {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

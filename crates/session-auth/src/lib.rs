//! MrDoc session credentials
//!
//! Provides the credential source contract, in-memory and file-backed
//! token stores, the API response envelope, and the login/refresh token
//! endpoint calls. This crate knows nothing about retry or refresh
//! coordination; `session-client` builds the request pipeline on top of it.
//!
//! Credential flow:
//! 1. Startup restores tokens via `store::FileCredentialStore::load()`
//! 2. `token::login()` obtains an access/refresh pair
//! 3. Tokens are saved via `CredentialSource::update_tokens()` (merge)
//! 4. On a 401, `token::refresh_access_token()` obtains a new access token
//! 5. A failed refresh ends the session through a `SessionHook`

pub mod constants;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod store;
pub mod token;

pub use constants::*;
pub use credentials::{ClearOnLogout, CredentialSource, MemoryCredentialStore, SessionHook, TokenBundle};
pub use envelope::{Envelope, EnvelopeHead, LoginRequest, LoginResult, RefreshResult, UserBrief};
pub use error::{Error, Result};
pub use store::FileCredentialStore;
pub use token::{insert_api_version, login, refresh_access_token};

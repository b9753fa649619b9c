//! MrDoc API v1 wire constants
//!
//! Every outbound request carries the API version header; the server echoes
//! it on every response envelope.

/// Protocol version header name (lowercase for `HeaderName::from_static`)
pub const API_VERSION_HEADER: &str = "api-version";

/// API version this client speaks
pub const API_VERSION: &str = "1.0";

/// Default API base when none is configured
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1";

/// Token refresh endpoint. A 401 from this path never triggers a refresh.
pub const REFRESH_PATH: &str = "/auth/refresh/";

/// Username/password login endpoint
pub const LOGIN_PATH: &str = "/auth/login/";

/// Current user endpoint
pub const ME_PATH: &str = "/users/me/";

/// Envelope `code` value for success
pub const CODE_OK: i64 = 0;

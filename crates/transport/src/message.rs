//! Request and response descriptors
//!
//! `ApiRequest` is a cloneable description of one API call: method, path
//! relative to the API base, query parameters, headers and an optional JSON
//! body. Keeping it as plain data is what lets a failed call be replayed
//! with identical method/body/params after credentials change.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Result, TransportError};

/// Outbound request descriptor.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `/docs/12/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter. Order is preserved on the wire.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, replacing any existing value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request targets `path`, ignoring a trailing slash.
    pub fn targets(&self, path: &str) -> bool {
        self.path.trim_end_matches('/') == path.trim_end_matches('/')
    }
}

/// Header values may carry bearer tokens, so only names are printed.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.keys().map(|k| k.as_str()).collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &header_names)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Response descriptor: status, headers and the raw body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Build a response with a JSON body (used by scripted transports).
    pub fn from_json(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::Decode(format!("invalid JSON body: {e}")))
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_method_and_path() {
        let req = ApiRequest::put("/projects/3/tree/").json(serde_json::json!({"tree": []}));
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.path, "/projects/3/tree/");
        assert_eq!(req.body, Some(serde_json::json!({"tree": []})));
        assert!(req.headers.is_empty());
    }

    #[test]
    fn query_preserves_insertion_order() {
        let req = ApiRequest::get("/projects/")
            .query("page", 2)
            .query("page_size", 10)
            .query("q", "rust");
        assert_eq!(
            req.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("page_size".to_string(), "10".to_string()),
                ("q".to_string(), "rust".to_string()),
            ]
        );
    }

    #[test]
    fn targets_ignores_trailing_slash() {
        assert!(ApiRequest::post("/auth/refresh/").targets("/auth/refresh"));
        assert!(ApiRequest::post("/auth/refresh").targets("/auth/refresh/"));
        assert!(!ApiRequest::post("/auth/login/").targets("/auth/refresh/"));
    }

    #[test]
    fn debug_redacts_header_values() {
        let req = ApiRequest::get("/users/me/").header(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret-token"),
        );
        let debug = format!("{req:?}");
        assert!(debug.contains("authorization"));
        assert!(!debug.contains("secret-token"), "got: {debug}");
    }

    #[test]
    fn response_json_decodes_envelope() {
        let resp = ApiResponse::from_json(
            StatusCode::OK,
            &serde_json::json!({"code": 0, "data": {"id": 7}, "msg": "ok"}),
        );
        assert!(resp.is_success());
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["data"]["id"], 7);
    }

    #[test]
    fn response_json_rejects_garbage() {
        let resp = ApiResponse::new(StatusCode::OK, "<html>");
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn unauthorized_detection() {
        assert!(ApiResponse::new(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(!ApiResponse::new(StatusCode::FORBIDDEN, "").is_unauthorized());
    }
}

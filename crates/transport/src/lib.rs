//! Transport abstraction for the session API
//!
//! Defines the request/response/failure vocabulary shared by every layer
//! above the wire, and the `Transport` trait the authenticated client and
//! the refresh coordinator dispatch through. `HttpTransport` is the reqwest
//! implementation; tests substitute scripted transports.

pub mod http;

pub use http::{HeaderInjection, HttpTransport};

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// An API call relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Serialize) -> Result<Self> {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: impl Serialize) -> Result<Self> {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// Fails with `InvalidRequest` when `body` has no JSON form (e.g. a map
    /// with non-string keys).
    pub fn with_body(mut self, body: impl Serialize) -> Result<Self> {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::InvalidRequest(format!("unserializable body: {e}")))?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A successful (2xx) answer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Classified transport failure.
///
/// `Status` carries the backend's machine-readable `code` when the error
/// body is a JSON object with a string `code` field, e.g.
/// `{"error": true, "code": "token.expired"}`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        code: Option<String>,
        body: serde_json::Value,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// HTTP status of a `Status` failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Backend error code of a `Status` failure.
    pub fn code(&self) -> Option<&str> {
        match self {
            TransportError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Sends API requests and classifies failures.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + '_>>;
}

/// Extract the `code` string from a JSON error body.
pub fn error_code(body: &serde_json::Value) -> Option<String> {
    body.get("code")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
}

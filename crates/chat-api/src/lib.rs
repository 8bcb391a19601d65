//! Remote chat service API abstraction
//!
//! Every call to the remote service goes through the `Transport` trait as an
//! `ApiRequest` (method, path, optional JSON body, header overrides and the
//! credential to present). `HttpTransport` is the reqwest-backed
//! implementation; it routes through `ProxyRotator` when a proxy list exists
//! and falls back to a direct connection otherwise.
//!
//! Errors carry enough detail (HTTP status, body, transport failure kind) for
//! callers to derive an `ErrorClassification` and pick a recovery strategy.

pub mod error;
pub mod headers;
pub mod http;
pub mod proxy;

pub use error::{ApiError, Result};
pub use headers::{HeaderInjection, PRIVATE_KEY_HEADER, SESSION_HEADER};
pub use http::HttpTransport;
pub use proxy::{ProxyRotator, TransportAdapter};

use common::Secret;
use reqwest::Method;
use std::future::Future;
use std::pin::Pin;

/// Classification of remote failures to determine the recovery strategy.
///
/// - Auth: rotate to another session token when one exists
/// - Transient: rotate proxy and back off, bounded
/// - RateLimited: not a failure, gates the send loop until the window resets
/// - Fatal: surface immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Session or credential rejected (401/403)
    Auth,
    /// Connect/timeout/reset or 5xx
    Transient,
    /// Quota exhausted
    RateLimited,
    /// Malformed response, missing credentials, anything else
    Fatal,
}

impl ErrorClassification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::Auth => "auth",
            ErrorClassification::Transient => "transient",
            ErrorClassification::RateLimited => "rate_limited",
            ErrorClassification::Fatal => "fatal",
        }
    }
}

/// Credential presented with a request.
#[derive(Debug, Clone, Default)]
pub enum RequestCredential {
    #[default]
    None,
    /// Sent as `X-Private-Key` (sign-in only)
    PrivateKey(Secret<String>),
    /// Sent as `X-Session-Token` (all authenticated calls)
    Session(Secret<String>),
}

/// One call against the remote API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Per-request header overrides, applied after the default set
    pub headers: Vec<(String, String)>,
    pub credential: RequestCredential,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            credential: RequestCredential::None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_credential(mut self, credential: RequestCredential) -> Self {
        self.credential = credential;
        self
    }

    /// Shorthand for `with_credential(RequestCredential::Session(..))`.
    pub fn with_session(self, token: &str) -> Self {
        self.with_credential(RequestCredential::Session(Secret::new(token.to_string())))
    }
}

/// Abstraction over how requests reach the remote service.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`), so tests can substitute scripted fakes.
pub trait Transport: Send + Sync {
    /// Send one request and decode the JSON response body.
    ///
    /// Non-2xx responses are returned as `ApiError::Status`. An empty success
    /// body decodes to `Value::Null`.
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;
}

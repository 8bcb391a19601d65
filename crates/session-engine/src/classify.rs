//! Failure classification for remote calls
//!
//! Maps an error to the recovery strategy the retry layer and the send loop
//! apply. 429 is always a rate limit; other statuses are classified by code,
//! with a body scan for rate-limit wording since the remote service sometimes
//! reports an exhausted quota with a 400.

use chat_api::{ApiError, ErrorClassification};

/// Body phrases that mean the quota is exhausted regardless of status.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "limit exceeded",
];

/// Anything the retry layer can classify.
pub trait Classify {
    fn classification(&self) -> ErrorClassification;
}

/// Whether a response body reports an exhausted quota.
pub fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Classify an HTTP failure by status and response body.
///
/// 401/403 are Auth (rotate the session), 429 is RateLimited, 408/5xx are
/// Transient (rotate proxy, back off). Any other status is Fatal unless the
/// body reports a rate limit.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    match status {
        401 | 403 => ErrorClassification::Auth,
        429 => ErrorClassification::RateLimited,
        408 | 500..=599 => ErrorClassification::Transient,
        _ if mentions_rate_limit(body) => ErrorClassification::RateLimited,
        _ => ErrorClassification::Fatal,
    }
}

/// Classify a transport-level error.
pub fn classify(error: &ApiError) -> ErrorClassification {
    match error {
        ApiError::Status { status, body } => classify_status(*status, body),
        ApiError::Timeout(_) | ApiError::Connect(_) | ApiError::Network(_) | ApiError::Proxy(_) => {
            ErrorClassification::Transient
        }
        ApiError::Decode(_) | ApiError::InvalidRequest(_) => ErrorClassification::Fatal,
    }
}

impl Classify for ApiError {
    fn classification(&self) -> ErrorClassification {
        classify(self)
    }
}

impl Classify for chat_auth::Error {
    fn classification(&self) -> ErrorClassification {
        match self {
            chat_auth::Error::Api(e) => classify(e),
            chat_auth::Error::SignIn(_) | chat_auth::Error::Io(_) => ErrorClassification::Fatal,
        }
    }
}

impl Classify for crate::Error {
    fn classification(&self) -> ErrorClassification {
        crate::Error::classification(self)
    }
}

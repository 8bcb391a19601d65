//! Outbound header construction and log redaction
//!
//! Every request carries the fixed default set, then any configured
//! injections, then the per-request overrides, and finally exactly one
//! credential header. Credential headers cannot be set through injections or
//! overrides.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

use crate::RequestCredential;
use crate::error::{ApiError, Result};

/// Session token header for authenticated calls.
pub const SESSION_HEADER: &str = "x-session-token";

/// Private key header for sign-in.
pub const PRIVATE_KEY_HEADER: &str = "x-private-key";

const DEFAULT_ORIGIN: &str = "https://klokapp.ai";
const DEFAULT_REFERER: &str = "https://klokapp.ai/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Headers whose values never reach a log line.
const REDACTED_HEADERS: &[&str] = &[SESSION_HEADER, PRIVATE_KEY_HEADER, "authorization"];

/// Extra header from config (name + value pair).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// The fixed default header set.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ORIGIN, HeaderValue::from_static(DEFAULT_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static(DEFAULT_REFERER));
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers
}

/// Build the full header map for one request.
///
/// Invalid injected headers are skipped with a warning (config mistakes
/// should not take the service down). Invalid per-request overrides and
/// credential values are programming errors and fail the request.
pub fn build_headers(
    injections: &[HeaderInjection],
    overrides: &[(String, String)],
    credential: &RequestCredential,
) -> Result<HeaderMap> {
    let mut headers = default_headers();

    for injection in injections {
        if is_credential_header(&injection.name) {
            warn!(header = %injection.name, "refusing to inject credential header from config");
            continue;
        }
        let name = match HeaderName::from_str(&injection.name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(&injection.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }

    for (name, value) in overrides {
        if is_credential_header(name) {
            return Err(ApiError::InvalidRequest(format!(
                "credential header {name} must be set through the request credential"
            )));
        }
        let name = HeaderName::from_str(name)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid header value: {e}")))?;
        headers.insert(name, value);
    }

    match credential {
        RequestCredential::None => {}
        RequestCredential::PrivateKey(key) => {
            headers.insert(
                HeaderName::from_static(PRIVATE_KEY_HEADER),
                sensitive_value(key.expose())?,
            );
        }
        RequestCredential::Session(token) => {
            headers.insert(
                HeaderName::from_static(SESSION_HEADER),
                sensitive_value(token.expose())?,
            );
        }
    }

    Ok(headers)
}

/// Header pairs safe to log: credential values replaced by `[REDACTED]`.
pub fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_credential_header(name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.to_string(), shown)
        })
        .collect()
}

fn is_credential_header(name: &str) -> bool {
    REDACTED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn sensitive_value(raw: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(raw)
        .map_err(|_| ApiError::InvalidRequest("credential is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;

    #[test]
    fn defaults_present() {
        let headers = build_headers(&[], &[], &RequestCredential::None).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(ORIGIN).unwrap(), DEFAULT_ORIGIN);
        assert_eq!(headers.get(REFERER).unwrap(), DEFAULT_REFERER);
        assert!(headers.get(USER_AGENT).is_some());
        assert!(headers.get(SESSION_HEADER).is_none());
    }

    #[test]
    fn session_credential_sets_header() {
        let cred = RequestCredential::Session(Secret::new("tok-1".into()));
        let headers = build_headers(&[], &[], &cred).unwrap();
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), "tok-1");
        assert!(headers.get(SESSION_HEADER).unwrap().is_sensitive());
        assert!(headers.get(PRIVATE_KEY_HEADER).is_none());
    }

    #[test]
    fn private_key_credential_sets_header() {
        let cred = RequestCredential::PrivateKey(Secret::new("0xkey".into()));
        let headers = build_headers(&[], &[], &cred).unwrap();
        assert_eq!(headers.get(PRIVATE_KEY_HEADER).unwrap(), "0xkey");
    }

    #[test]
    fn injections_and_overrides_apply_in_order() {
        let injections = vec![HeaderInjection {
            name: "x-client".into(),
            value: "config".into(),
        }];
        let overrides = vec![("x-client".to_string(), "request".to_string())];
        let headers = build_headers(&injections, &overrides, &RequestCredential::None).unwrap();
        assert_eq!(headers.get("x-client").unwrap(), "request");
    }

    #[test]
    fn injected_credential_header_is_ignored() {
        let injections = vec![HeaderInjection {
            name: "X-Session-Token".into(),
            value: "sneaky".into(),
        }];
        let headers = build_headers(&injections, &[], &RequestCredential::None).unwrap();
        assert!(headers.get(SESSION_HEADER).is_none());
    }

    #[test]
    fn override_credential_header_is_rejected() {
        let overrides = vec![("x-private-key".to_string(), "k".to_string())];
        let result = build_headers(&[], &overrides, &RequestCredential::None);
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn invalid_injection_is_skipped() {
        let injections = vec![HeaderInjection {
            name: "bad header".into(),
            value: "v".into(),
        }];
        let headers = build_headers(&injections, &[], &RequestCredential::None).unwrap();
        assert_eq!(headers.len(), default_headers().len());
    }

    #[test]
    fn redaction_hides_credentials() {
        let cred = RequestCredential::Session(Secret::new("super-secret-session".into()));
        let headers = build_headers(&[], &[], &cred).unwrap();
        let shown = redacted(&headers);
        let session = shown
            .iter()
            .find(|(name, _)| name == SESSION_HEADER)
            .unwrap();
        assert_eq!(session.1, "[REDACTED]");
        assert!(
            !format!("{shown:?}").contains("super-secret-session"),
            "session token leaked into log form"
        );
    }
}

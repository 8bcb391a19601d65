//! Single identity calls against the remote service

use chat_api::{ApiRequest, RequestCredential, Transport};
use tracing::debug;

use crate::constants::{PROFILE_PATH, SESSION_TOKEN_FIELD, SIGNIN_PATH};
use crate::credentials::PrivateKey;
use crate::error::{Error, Result};

/// Exchange a private key for a session token.
pub async fn sign_in(transport: &dyn Transport, key: &PrivateKey) -> Result<String> {
    let request = ApiRequest::post(SIGNIN_PATH)
        .with_body(serde_json::json!({}))
        .with_credential(RequestCredential::PrivateKey(key.clone()));
    let response = transport.send(&request).await?;

    let token = response
        .get(SESSION_TOKEN_FIELD)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::SignIn(format!("response has no {SESSION_TOKEN_FIELD}")))?;

    debug!(token = %common::fingerprint(token), "signed in");
    Ok(token.to_string())
}

/// Fetch the profile for a session token. Any success means the token is live.
pub async fn fetch_profile(transport: &dyn Transport, token: &str) -> Result<serde_json::Value> {
    let request = ApiRequest::get(PROFILE_PATH).with_session(token);
    Ok(transport.send(&request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_api::ApiError;
    use common::Secret;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Returns a fixed response and remembers the last request.
    struct Scripted {
        response: std::result::Result<serde_json::Value, ApiError>,
        last: Mutex<Option<ApiRequest>>,
    }

    impl Scripted {
        fn new(response: std::result::Result<serde_json::Value, ApiError>) -> Self {
            Self {
                response,
                last: Mutex::new(None),
            }
        }
    }

    impl Transport for Scripted {
        fn send<'a>(
            &'a self,
            request: &'a ApiRequest,
        ) -> Pin<Box<dyn Future<Output = chat_api::Result<serde_json::Value>> + Send + 'a>>
        {
            *self.last.lock().unwrap() = Some(request.clone());
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    #[tokio::test]
    async fn sign_in_returns_session_token() {
        let transport = Scripted::new(Ok(serde_json::json!({"session_token": "tok-123"})));
        let key = Secret::new("0xkey".to_string());

        let token = sign_in(&transport, &key).await.unwrap();
        assert_eq!(token, "tok-123");

        let last = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.path, SIGNIN_PATH);
        assert_eq!(last.method.as_str(), "POST");
        assert!(
            matches!(last.credential, RequestCredential::PrivateKey(ref k) if k.expose() == "0xkey")
        );
    }

    #[tokio::test]
    async fn sign_in_without_token_is_error() {
        let transport = Scripted::new(Ok(serde_json::json!({"message": "ok"})));
        let err = sign_in(&transport, &Secret::new("k".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SignIn(_)), "got {err:?}");

        let transport = Scripted::new(Ok(serde_json::json!({"session_token": "  "})));
        let err = sign_in(&transport, &Secret::new("k".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SignIn(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn sign_in_propagates_api_error() {
        let transport = Scripted::new(Err(ApiError::Status {
            status: 401,
            body: "bad key".into(),
        }));
        let err = sign_in(&transport, &Secret::new("k".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::Status { status: 401, .. })));
    }

    #[tokio::test]
    async fn fetch_profile_sends_session_header() {
        let transport = Scripted::new(Ok(serde_json::json!({"id": "user-1"})));
        let profile = fetch_profile(&transport, "tok-9").await.unwrap();
        assert_eq!(profile["id"], "user-1");

        let last = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.path, PROFILE_PATH);
        assert!(matches!(last.credential, RequestCredential::Session(ref s) if s.expose() == "tok-9"));
    }
}

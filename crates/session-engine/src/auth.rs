//! Authentication boundary
//!
//! `AuthService` combines the credential store, the session registry and the
//! retry executor into the operations the automation layer consumes: login,
//! profile lookup, token info, single-token verification, the verification
//! sweep, and authenticated API requests.

use std::sync::Arc;

use chat_api::{ApiRequest, Transport};
use chat_auth::{CredentialStore, PROFILE_PATH, SessionRegistry, TokenInfo};
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::retry::RetryExecutor;
use crate::verify::{SweepReport, sweep};

/// Default number of concurrent probes in a verification sweep.
pub const DEFAULT_VERIFY_CONCURRENCY: usize = 20;

pub struct AuthService {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    registry: Arc<SessionRegistry>,
    executor: Arc<RetryExecutor>,
    verify_concurrency: usize,
}

impl AuthService {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        registry: Arc<SessionRegistry>,
        executor: Arc<RetryExecutor>,
    ) -> Self {
        Self {
            transport,
            credentials,
            registry,
            executor,
            verify_concurrency: DEFAULT_VERIFY_CONCURRENCY,
        }
    }

    pub fn with_verify_concurrency(mut self, workers: usize) -> Self {
        self.verify_concurrency = workers.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Sign in with the current private key (the next one if `switch_key`)
    /// and make the new session current.
    ///
    /// On failure the remaining keys are tried in rotation order, each at
    /// most once. No keys at all is fatal.
    pub async fn login(&self, switch_key: bool) -> Result<String> {
        if switch_key {
            self.credentials.advance().await;
        }
        let total = self.credentials.len().await;
        if total == 0 {
            return Err(Error::NoPrivateKey);
        }

        let mut last_error = None;
        for tried in 0..total {
            if tried > 0 {
                self.credentials.advance().await;
            }
            let Some(key) = self.credentials.current_key().await else {
                return Err(Error::NoPrivateKey);
            };
            let key_index = self.credentials.current_index().await;

            let result = self
                .executor
                .execute_without_rotation("sign_in", || {
                    chat_auth::sign_in(self.transport.as_ref(), &key)
                })
                .await;

            match result {
                Ok(token) => {
                    let account = self.registry.activate(token.clone()).await?;
                    info!(
                        key_index = key_index + 1,
                        total_keys = total,
                        account = account + 1,
                        token = %common::fingerprint(&token),
                        "authentication successful"
                    );
                    return Ok(token);
                }
                Err(e) => {
                    warn!(key_index = key_index + 1, total_keys = total, error = %e, "authentication failed");
                    last_error = Some(Error::from(e));
                }
            }
        }

        Err(Error::AuthFailed {
            attempts: total,
            last: Box::new(last_error.unwrap_or(Error::NoPrivateKey)),
        })
    }

    /// Profile of the current session, from cache when allowed.
    pub async fn user_info(&self, use_cache: bool) -> Result<serde_json::Value> {
        if use_cache && let Some(profile) = self.registry.cached_profile().await {
            debug!("returning cached profile");
            return Ok(profile);
        }
        let profile = self.request(Method::GET, PROFILE_PATH, None, &[]).await?;
        self.registry.cache_profile(profile.clone()).await;
        Ok(profile)
    }

    pub async fn token_info(&self) -> TokenInfo {
        self.registry.info().await
    }

    /// Whether `token` is accepted by the remote service.
    ///
    /// Transient failures are retried; any final failure counts as invalid.
    pub async fn verify_token(&self, token: String) -> bool {
        let result = self
            .executor
            .execute_without_rotation("verify_token", || {
                chat_auth::fetch_profile(self.transport.as_ref(), &token)
            })
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                debug!(token = %common::fingerprint(&token), error = %e, "token verification failed");
                false
            }
        }
    }

    /// Probe every known token and keep only the valid ones.
    pub async fn verify_and_cleanup(&self) -> Result<SweepReport> {
        sweep(&self.registry, self.verify_concurrency, |token| {
            self.verify_token(token)
        })
        .await
    }

    /// Authenticated call with the current session token.
    ///
    /// The token is read on every attempt so that an auth-driven rotation
    /// takes effect on the retry.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value> {
        let label = format!("{method} {path}");
        self.executor
            .execute(&label, || async {
                let token = self.registry.current().await.ok_or(Error::NotAuthenticated)?;
                let mut request = ApiRequest::new(method.clone(), path).with_session(&token);
                if let Some(body) = &body {
                    request = request.with_body(body.clone());
                }
                for (name, value) in headers {
                    request = request.with_header(name.clone(), value.clone());
                }
                Ok(self.transport.send(&request).await?)
            })
            .await
    }
}

//! Classification-driven retry around remote calls
//!
//! `RetryExecutor::execute` runs an operation in an explicit loop:
//!
//! - Auth failure with more than one known session token: rotate to the next
//!   token and start over with the attempt counter at zero. Rotation is
//!   bounded to one full cycle of the tokens per call.
//! - Transient failure below the retry cap: rotate the proxy, wait
//!   `base_delay * multiplier^attempt` (deterministic, no jitter), retry.
//! - Anything else, or a cap reached: return the failure unchanged.
//!
//! Every transition is reported to a `RetryObserver`; the executor itself
//! keeps no state between calls.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chat_api::{ErrorClassification, ProxyRotator};
use chat_auth::SessionRegistry;
use tracing::{debug, info, warn};

use crate::classify::Classify;

/// Upper bound on a single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Backoff parameters for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(2000),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero-based), capped at
    /// `MAX_BACKOFF`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

/// One transition inside a retried call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent {
    /// Switched to the next session token after an auth failure
    TokenRotated { rotation: usize, token: String },
    /// Switched proxy after a transient failure
    ProxyRotated { attempt: u32, switched: bool },
    /// About to wait before the next attempt
    Backoff { attempt: u32, delay: Duration },
    /// Returning the failure to the caller
    GaveUp {
        classification: ErrorClassification,
        attempts: u32,
    },
}

impl RetryEvent {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RetryEvent::TokenRotated { .. } => "token_rotated",
            RetryEvent::ProxyRotated { .. } => "proxy_rotated",
            RetryEvent::Backoff { .. } => "backoff",
            RetryEvent::GaveUp { .. } => "gave_up",
        }
    }
}

/// Receives retry transitions.
pub trait RetryObserver: Send + Sync {
    fn on_event(&self, label: &str, event: &RetryEvent);
}

/// Default observer: structured log line plus a counter per event kind.
pub struct LoggingObserver;

impl RetryObserver for LoggingObserver {
    fn on_event(&self, label: &str, event: &RetryEvent) {
        metrics::counter!("retry_events_total", "kind" => event.kind()).increment(1);
        match event {
            RetryEvent::TokenRotated { rotation, token } => {
                info!(operation = label, rotation, token = %token, "auth rejected, rotated session token");
            }
            RetryEvent::ProxyRotated { attempt, switched } => {
                debug!(operation = label, attempt, switched, "transient failure, rotated proxy");
            }
            RetryEvent::Backoff { attempt, delay } => {
                info!(
                    operation = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
            }
            RetryEvent::GaveUp {
                classification,
                attempts,
            } => {
                warn!(
                    operation = label,
                    classification = classification.label(),
                    attempts,
                    "giving up"
                );
            }
        }
    }
}

/// Wraps remote calls with rotation and backoff.
pub struct RetryExecutor {
    registry: Arc<SessionRegistry>,
    proxies: Arc<ProxyRotator>,
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
}

impl RetryExecutor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        proxies: Arc<ProxyRotator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            proxies,
            policy,
            observer: Arc::new(LoggingObserver),
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` with token rotation on auth failures and proxy
    /// rotation plus backoff on transient failures.
    ///
    /// The operation must read the current session token on every call so
    /// that a rotation takes effect on the next attempt.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.run(label, true, operation).await
    }

    /// Like `execute`, but auth failures are returned immediately.
    ///
    /// For calls that carry a fixed credential (sign-in with a private key,
    /// probing one specific session token).
    pub async fn execute_without_rotation<T, E, F, Fut>(
        &self,
        label: &str,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.run(label, false, operation).await
    }

    async fn run<T, E, F, Fut>(&self, label: &str, rotate_tokens: bool, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt: u32 = 0;
        let mut rotations: usize = 0;
        let mut calls: u32 = 0;

        loop {
            calls += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let classification = error.classification();
            debug!(
                operation = label,
                attempt,
                classification = classification.label(),
                error = %error,
                "attempt failed"
            );

            match classification {
                ErrorClassification::Auth if rotate_tokens => {
                    let total = self.registry.info().await.total;
                    if total > 1
                        && rotations + 1 < total
                        && let Some(token) = self.registry.advance().await
                    {
                        rotations += 1;
                        attempt = 0;
                        self.emit(
                            label,
                            RetryEvent::TokenRotated {
                                rotation: rotations,
                                token: common::fingerprint(&token),
                            },
                        );
                        continue;
                    }
                }
                ErrorClassification::Transient if attempt < self.policy.max_retries => {
                    let switched = self.proxies.advance().await.is_some();
                    self.emit(label, RetryEvent::ProxyRotated { attempt, switched });

                    let delay = self.policy.delay_for(attempt);
                    self.emit(label, RetryEvent::Backoff { attempt, delay });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                _ => {}
            }

            self.emit(
                label,
                RetryEvent::GaveUp {
                    classification,
                    attempts: calls,
                },
            );
            return Err(error);
        }
    }

    fn emit(&self, label: &str, event: RetryEvent) {
        self.observer.on_event(label, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_api::ApiError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<RetryEvent>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<RetryEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, kind: &str) -> usize {
            self.events().iter().filter(|e| e.kind() == kind).count()
        }

        fn delays(&self) -> Vec<Duration> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    RetryEvent::Backoff { delay, .. } => Some(*delay),
                    _ => None,
                })
                .collect()
        }
    }

    impl RetryObserver for Recorder {
        fn on_event(&self, _label: &str, event: &RetryEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn executor(tokens: &[&str]) -> (RetryExecutor, Arc<Recorder>, Arc<SessionRegistry>, Arc<ProxyRotator>) {
        let registry = Arc::new(SessionRegistry::in_memory(
            tokens.iter().map(|t| t.to_string()).collect(),
        ));
        let proxies = Arc::new(ProxyRotator::from_list(
            vec!["http://p1.example:1".into(), "http://p2.example:2".into()],
            Duration::from_secs(10),
        ));
        let recorder = Arc::new(Recorder::default());
        let executor = RetryExecutor::new(registry.clone(), proxies.clone(), RetryPolicy::default())
            .with_observer(recorder.clone());
        (executor, recorder, registry, proxies)
    }

    fn transient() -> ApiError {
        ApiError::Connect("connection reset".into())
    }

    fn unauthorized() -> ApiError {
        ApiError::Status {
            status: 401,
            body: "invalid session".into(),
        }
    }

    #[test]
    fn backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(6750));
    }

    #[test]
    fn backoff_is_capped_for_large_attempts() {
        let policy = RetryPolicy {
            max_retries: 200,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(20), MAX_BACKOFF);
        assert_eq!(policy.delay_for(120), MAX_BACKOFF);
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_transient_failures() {
        for k in 1..5usize {
            let (executor, recorder, _registry, _proxies) = executor(&["t1"]);
            let calls = Arc::new(AtomicUsize::new(0));
            let started = tokio::time::Instant::now();

            let result = executor
                .execute("probe", || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < k { Err(transient()) } else { Ok(n) }
                    }
                })
                .await;

            assert_eq!(result.unwrap(), k);
            assert_eq!(recorder.count("proxy_rotated"), k, "k = {k}");
            let expected: Vec<Duration> = (0..k)
                .map(|i| Duration::from_secs_f64(2.0 * 1.5f64.powi(i as i32)))
                .collect();
            assert_eq!(recorder.delays(), expected, "k = {k}");
            assert!(started.elapsed() >= expected.iter().sum::<Duration>());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_rotates_proxy() {
        let (executor, _recorder, _registry, proxies) = executor(&["t1"]);
        let calls = Arc::new(AtomicUsize::new(0));
        executor
            .execute("probe", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transient())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(proxies.current().await.as_deref(), Some("http://p2.example:2"));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let (executor, recorder, _registry, _proxies) = executor(&["t1"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = executor
            .execute("send", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Connect(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(recorder.count("backoff"), 5);
        assert_eq!(
            recorder.events().last(),
            Some(&RetryEvent::GaveUp {
                classification: ErrorClassification::Transient,
                attempts: 6
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_rotates_once_and_resets_attempts() {
        let (executor, recorder, registry, _proxies) = executor(&["t1", "t2"]);
        let calls = Arc::new(AtomicUsize::new(0));

        // Two transient failures, then auth, then five more transient failures
        // before success: only possible if the counter restarted at zero.
        let registry_in_op = registry.clone();
        let result = executor
            .execute("send", || {
                let calls = calls.clone();
                let registry = registry_in_op.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    let token = registry.current().await.unwrap();
                    match n {
                        0 | 1 => Err(transient()),
                        2 => Err(unauthorized()),
                        3..=7 => Err(transient()),
                        _ => Ok(token),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "t2");
        assert_eq!(recorder.count("token_rotated"), 1);
        assert_eq!(recorder.count("backoff"), 7);
        let delays = recorder.delays();
        assert_eq!(delays[2], Duration::from_millis(2000), "counter reset after rotation");
    }

    #[tokio::test]
    async fn auth_rotation_bounded_to_one_cycle() {
        let (executor, recorder, registry, _proxies) = executor(&["t1", "t2", "t3"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = executor
            .execute("send", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(unauthorized())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "each token tried once");
        assert_eq!(recorder.count("token_rotated"), 2);
        assert_eq!(registry.current().await.as_deref(), Some("t3"));
    }

    #[tokio::test]
    async fn auth_with_single_token_propagates() {
        let (executor, recorder, _registry, _proxies) = executor(&["t1"]);
        let err = executor
            .execute("send", || async { Err::<(), _>(unauthorized()) })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(recorder.count("token_rotated"), 0);
    }

    #[tokio::test]
    async fn without_rotation_never_touches_tokens() {
        let (executor, recorder, registry, _proxies) = executor(&["t1", "t2"]);
        let err = executor
            .execute_without_rotation("verify", || async { Err::<(), _>(unauthorized()) })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(recorder.count("token_rotated"), 0);
        assert_eq!(registry.current().await.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn fatal_is_not_retried() {
        let (executor, recorder, _registry, _proxies) = executor(&["t1", "t2"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let err = executor
            .execute("send", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ApiError::Decode("not json".into()))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Decode(ref m) if m == "not json"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.events().len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_is_returned_to_caller() {
        let (executor, recorder, _registry, _proxies) = executor(&["t1", "t2"]);
        let err = executor
            .execute("send", || async {
                Err::<(), _>(ApiError::Status {
                    status: 429,
                    body: String::new(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(recorder.count("proxy_rotated") + recorder.count("token_rotated"), 0);
    }
}

//! Resilient request execution for multi-account chat sessions
//!
//! Sits between the automation loop and the raw identity/API crates:
//!
//! 1. Every remote call runs through `RetryExecutor::execute`, which
//!    classifies failures and recovers locally where it can: auth failures
//!    rotate the session token, transient failures rotate the proxy and back
//!    off, everything else surfaces.
//! 2. `AuthService` is the authentication boundary (login over the private
//!    keys, profile lookup, token info, verification sweep) and the entry
//!    point for authenticated requests.
//! 3. `RateLimitTracker` keeps the last quota window so the send loop can
//!    hold off during a cooldown.

pub mod auth;
pub mod classify;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod verify;

pub use auth::{AuthService, DEFAULT_VERIFY_CONCURRENCY};
pub use classify::{Classify, classify, classify_status};
pub use error::{Error, Result};
pub use rate_limit::{Clock, RateLimitTracker, RateLimitWindow, unix_now};
pub use retry::{
    LoggingObserver, MAX_BACKOFF, RetryEvent, RetryExecutor, RetryObserver, RetryPolicy,
};
pub use verify::{SweepReport, sweep};

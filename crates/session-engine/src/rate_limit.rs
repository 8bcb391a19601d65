//! Last known rate-limit window
//!
//! The remote service reports quota as `{limit, remaining, reset_time,
//! current_usage}` where `reset_time` is seconds until the window resets.
//! The tracker stores it with an absolute reset epoch so cooldown can be
//! checked at any later time: cooldown is active while `remaining <= 0` and
//! the reset epoch is still in the future.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Snapshot of the quota window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitWindow {
    pub limit: i64,
    pub remaining: i64,
    /// Unix seconds at which the window resets
    pub reset_epoch: u64,
    pub current_usage: i64,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    #[serde(default)]
    limit: i64,
    remaining: i64,
    #[serde(default, alias = "resetTime")]
    reset_time: f64,
    #[serde(default, alias = "currentUsage")]
    current_usage: i64,
}

impl RateLimitWindow {
    /// Convert a rate-limit response observed at `now` (unix seconds).
    pub fn from_response(response: &serde_json::Value, now: u64) -> Result<Self> {
        let parsed: RateLimitResponse = serde_json::from_value(response.clone())
            .map_err(|e| Error::InvalidResponse(format!("rate limit: {e}")))?;
        let reset_in = if parsed.reset_time.is_finite() && parsed.reset_time > 0.0 {
            parsed.reset_time.ceil() as u64
        } else {
            0
        };
        Ok(Self {
            limit: parsed.limit,
            remaining: parsed.remaining,
            reset_epoch: now.saturating_add(reset_in),
            current_usage: parsed.current_usage,
        })
    }

    /// A window with nothing left for `seconds` from `now`.
    pub fn exhausted_for(seconds: u64, now: u64) -> Self {
        Self {
            limit: 0,
            remaining: 0,
            reset_epoch: now.saturating_add(seconds),
            current_usage: 0,
        }
    }

    pub fn is_cooldown_active_at(&self, now: u64) -> bool {
        self.remaining <= 0 && now < self.reset_epoch
    }

    pub fn seconds_until_reset(&self, now: u64) -> u64 {
        self.reset_epoch.saturating_sub(now)
    }
}

/// Source of wall-clock unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Holds the latest `RateLimitWindow`.
pub struct RateLimitTracker {
    window: RwLock<Option<RateLimitWindow>>,
    clock: Clock,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(unix_now))
    }

    /// Tracker reading time from `clock` instead of the system clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            window: RwLock::new(None),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    pub async fn record(&self, window: RateLimitWindow) {
        debug!(
            limit = window.limit,
            remaining = window.remaining,
            reset_in_secs = window.seconds_until_reset(self.now()),
            "rate limit recorded"
        );
        *self.window.write().await = Some(window);
    }

    pub async fn current(&self) -> Option<RateLimitWindow> {
        self.window.read().await.clone()
    }

    pub async fn is_cooldown_active(&self) -> bool {
        let now = self.now();
        self.window
            .read()
            .await
            .as_ref()
            .is_some_and(|w| w.is_cooldown_active_at(now))
    }

    /// Seconds left in an active cooldown, `None` when not cooling down.
    pub async fn cooldown_remaining(&self) -> Option<u64> {
        let now = self.now();
        self.window
            .read()
            .await
            .as_ref()
            .filter(|w| w.is_cooldown_active_at(now))
            .map(|w| w.seconds_until_reset(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn manual_clock(start: u64) -> (Clock, Arc<AtomicU64>) {
        let now = Arc::new(AtomicU64::new(start));
        let handle = now.clone();
        (Arc::new(move || handle.load(Ordering::SeqCst)), now)
    }

    #[test]
    fn converts_relative_reset_to_epoch() {
        let response = serde_json::json!({
            "limit": 50,
            "remaining": 0,
            "reset_time": 120,
            "current_usage": 50
        });
        let window = RateLimitWindow::from_response(&response, 1_000).unwrap();
        assert_eq!(
            window,
            RateLimitWindow {
                limit: 50,
                remaining: 0,
                reset_epoch: 1_120,
                current_usage: 50
            }
        );
    }

    #[test]
    fn accepts_camel_case_fields() {
        let response = serde_json::json!({"limit": 10, "remaining": 3, "resetTime": 9.2, "currentUsage": 7});
        let window = RateLimitWindow::from_response(&response, 0).unwrap();
        assert_eq!(window.reset_epoch, 10);
        assert_eq!(window.current_usage, 7);
    }

    #[test]
    fn missing_remaining_is_invalid() {
        let err = RateLimitWindow::from_response(&serde_json::json!({"limit": 1}), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn cooldown_follows_clock() {
        let (clock, now) = manual_clock(1_000);
        let tracker = RateLimitTracker::with_clock(clock);
        assert!(!tracker.is_cooldown_active().await);

        tracker.record(RateLimitWindow::exhausted_for(30, 1_000)).await;
        assert!(tracker.is_cooldown_active().await);
        assert_eq!(tracker.cooldown_remaining().await, Some(30));

        now.store(1_029, Ordering::SeqCst);
        assert!(tracker.is_cooldown_active().await);

        now.store(1_030, Ordering::SeqCst);
        assert!(!tracker.is_cooldown_active().await);
        assert_eq!(tracker.cooldown_remaining().await, None);
    }

    #[tokio::test]
    async fn remaining_quota_means_no_cooldown() {
        let (clock, _now) = manual_clock(0);
        let tracker = RateLimitTracker::with_clock(clock);
        tracker
            .record(RateLimitWindow {
                limit: 10,
                remaining: 4,
                reset_epoch: 500,
                current_usage: 6,
            })
            .await;
        assert!(!tracker.is_cooldown_active().await);
        assert_eq!(tracker.current().await.unwrap().remaining, 4);
    }
}

//! Automation scheduler
//!
//! Owns the `AutomationState` and executes the actions `state::handle_event`
//! returns: login and account snapshot on start, the send loop, the
//! account-switch timer and the auto-restart timer.
//!
//! Every start bumps a run id. The send loop and the timers carry the id
//! they were spawned under and go quiet once it no longer matches or the
//! state leaves `Running`, so a pause followed by a quick resume never
//! leaves two loops sending.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_api::ErrorClassification;
use chat_auth::TokenInfo;
use rand::RngExt;
use serde::Serialize;
use session_engine::{AuthService, RateLimitTracker, RateLimitWindow, SweepReport};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatClient, Points, new_thread_id, select_default_model};
use crate::config::AutomationConfig;
use crate::error::{Error, Result};
use crate::generator::ContentGenerator;
use crate::metrics;
use crate::state::{AutomationAction, AutomationEvent, AutomationState, handle_event};

/// Cooldown recorded when a send is rate limited but the remote window
/// cannot be read or does not show exhaustion.
pub const RATE_LIMIT_FALLBACK_SECS: u64 = 60;

pub const REASON_TOO_MANY_ERRORS: &str = "too many errors";
pub const REASON_ACCOUNT_ERRORS: &str = "account errors";

/// Account-scoped data fetched on start and on every account switch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountSnapshot {
    pub profile: Option<serde_json::Value>,
    pub points: Option<Points>,
    pub rate_limit: Option<RateLimitWindow>,
    pub model: Option<String>,
    pub thread_id: Option<String>,
    pub last_error: Option<String>,
}

/// Status report for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationStatus {
    pub state: &'static str,
    pub reason: Option<String>,
    pub tokens: TokenInfo,
    pub consecutive_errors: u32,
    pub messages_sent: u64,
    pub switch_pending: bool,
    pub cooldown_remaining_secs: Option<u64>,
    pub account: AccountSnapshot,
}

#[derive(Default)]
struct Timers {
    switch: Option<JoinHandle<()>>,
    restart: Option<JoinHandle<()>>,
}

struct Inner {
    auth: Arc<AuthService>,
    chat: ChatClient,
    generator: Arc<dyn ContentGenerator>,
    rate_limit: Arc<RateLimitTracker>,
    settings: AutomationConfig,
    state: Mutex<AutomationState>,
    run_id: AtomicU64,
    switch_pending: AtomicBool,
    consecutive_errors: AtomicU32,
    messages_sent: AtomicU64,
    timers: Mutex<Timers>,
    snapshot: RwLock<AccountSnapshot>,
    switch_lock: tokio::sync::Mutex<()>,
}

/// Handle to the automation. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        auth: Arc<AuthService>,
        generator: Arc<dyn ContentGenerator>,
        rate_limit: Arc<RateLimitTracker>,
        settings: AutomationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                chat: ChatClient::new(auth.clone()),
                auth,
                generator,
                rate_limit,
                settings,
                state: Mutex::new(AutomationState::Idle),
                run_id: AtomicU64::new(0),
                switch_pending: AtomicBool::new(false),
                consecutive_errors: AtomicU32::new(0),
                messages_sent: AtomicU64::new(0),
                timers: Mutex::new(Timers::default()),
                snapshot: RwLock::new(AccountSnapshot::default()),
                switch_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Log in, fetch the account snapshot, open a thread and start sending.
    ///
    /// A transient failure arms one delayed restart.
    pub async fn start(&self) -> Result<()> {
        match self.inner.transition(AutomationEvent::StartRequested) {
            AutomationAction::BeginStart => self.inner.begin_start().await,
            _ => Err(Error::AlreadyRunning),
        }
    }

    /// Stop sending after the current iteration; timers are cancelled.
    pub fn pause(&self) -> Result<()> {
        match self.inner.transition(AutomationEvent::PauseRequested) {
            AutomationAction::CancelTimers => {
                self.inner.cancel_timers();
                self.inner.switch_pending.store(false, Ordering::SeqCst);
                info!("automation paused");
                Ok(())
            }
            _ => Err(Error::NotRunning),
        }
    }

    /// Same as `start`: logs in again and opens a new thread.
    pub async fn resume(&self) -> Result<()> {
        self.start().await
    }

    /// Rotate to the next account now.
    pub async fn switch_account(&self) -> Result<()> {
        self.inner.perform_switch().await
    }

    pub fn state(&self) -> AutomationState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state().is_running()
    }

    pub async fn status(&self) -> AutomationStatus {
        let state = self.inner.state();
        let reason = match &state {
            AutomationState::Stopped { reason } => Some(reason.clone()),
            _ => None,
        };
        AutomationStatus {
            state: state.label(),
            reason,
            tokens: self.inner.auth.token_info().await,
            consecutive_errors: self.inner.consecutive_errors.load(Ordering::SeqCst),
            messages_sent: self.inner.messages_sent.load(Ordering::SeqCst),
            switch_pending: self.inner.switch_pending.load(Ordering::SeqCst),
            cooldown_remaining_secs: self.inner.rate_limit.cooldown_remaining().await,
            account: self.inner.snapshot.read().await.clone(),
        }
    }

    /// Probe every known session token and drop the dead ones.
    pub async fn verify_tokens(&self) -> Result<SweepReport> {
        let report = self.inner.auth.verify_and_cleanup().await?;
        info!(total = report.total, valid = report.valid, "token verification complete");
        Ok(report)
    }
}

impl Inner {
    fn state(&self) -> AutomationState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, AutomationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, event: AutomationEvent) -> AutomationAction {
        let mut state = self.lock_state();
        let (next, action) = handle_event(state.clone(), event);
        if next != *state {
            info!(from = state.label(), to = next.label(), "automation state changed");
        }
        metrics::set_running(next.is_running());
        *state = next;
        action
    }

    fn is_active(&self, run: u64) -> bool {
        self.run_id.load(Ordering::SeqCst) == run && self.state().is_running()
    }

    fn cancel_timers(&self) {
        let mut timers = self.lock_timers();
        if let Some(handle) = timers.switch.take() {
            handle.abort();
        }
        if let Some(handle) = timers.restart.take() {
            handle.abort();
        }
    }

    async fn begin_start(self: &Arc<Self>) -> Result<()> {
        let run = self.run_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_timers();
        self.consecutive_errors.store(0, Ordering::SeqCst);
        self.switch_pending.store(false, Ordering::SeqCst);
        info!(run, "starting automation");

        match self.bootstrap().await {
            Ok(()) => {
                if self.transition(AutomationEvent::Started) == AutomationAction::EnterLoop {
                    self.arm_switch_timer().await;
                    tokio::spawn(Arc::clone(self).run_loop(run));
                }
                Ok(())
            }
            Err(e) => {
                let transient = e.classification() == ErrorClassification::Transient;
                error!(error = %e, transient, "failed to start automation");
                self.snapshot.write().await.last_error = Some(e.to_string());
                let action = self.transition(AutomationEvent::StartFailed {
                    reason: e.to_string(),
                    transient,
                });
                if action == AutomationAction::ScheduleRestart {
                    self.schedule_restart();
                }
                Err(e)
            }
        }
    }

    async fn bootstrap(&self) -> Result<()> {
        self.auth.login(false).await?;
        self.refresh_account().await?;

        let models = self.chat.models().await?;
        let model = select_default_model(&models)
            .map(|m| m.name.clone())
            .ok_or_else(|| session_engine::Error::InvalidResponse("no models available".into()))?;
        info!(model = %model, available = models.len(), "model selected");

        let thread_id = new_thread_id();
        let mut snapshot = self.snapshot.write().await;
        snapshot.model = Some(model);
        snapshot.thread_id = Some(thread_id);
        Ok(())
    }

    /// Re-read profile, points and rate limit for the current session.
    async fn refresh_account(&self) -> Result<()> {
        let profile = self.auth.user_info(true).await?;
        let points = self.chat.points().await?;
        let window = self.chat.rate_limit(self.rate_limit.now()).await?;
        self.rate_limit.record(window.clone()).await;

        let tokens = self.auth.token_info().await;
        info!(
            account = tokens.current_index + 1,
            accounts = tokens.total,
            total_points = points.total_points,
            remaining = window.remaining,
            "account snapshot refreshed"
        );

        let mut snapshot = self.snapshot.write().await;
        snapshot.profile = Some(profile);
        snapshot.points = Some(points);
        snapshot.rate_limit = Some(window);
        Ok(())
    }

    fn schedule_restart(self: &Arc<Self>) {
        let delay = Duration::from_secs(self.settings.restart_delay_secs);
        info!(restart_in_secs = delay.as_secs(), "scheduling automation restart");
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach before starting so cancel_timers does not abort this task.
            inner.lock_timers().restart.take();
            if inner.transition(AutomationEvent::RestartTimer) == AutomationAction::BeginStart {
                info!("restarting automation");
                let _ = inner.begin_start().await;
            }
        });
        self.lock_timers().restart = Some(handle);
    }

    /// Arm the one-shot switch timer; only with more than one session.
    async fn arm_switch_timer(self: &Arc<Self>) {
        let tokens = self.auth.token_info().await;
        let run = self.run_id.load(Ordering::SeqCst);
        let mut timers = self.lock_timers();
        if let Some(handle) = timers.switch.take() {
            handle.abort();
        }
        if !tokens.has_multiple || !self.state().is_running() {
            debug!(accounts = tokens.total, "account switch not scheduled");
            return;
        }

        let interval = Duration::from_secs(self.settings.switch_interval_secs);
        let inner = Arc::clone(self);
        timers.switch = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if inner.is_active(run) {
                info!("scheduled account switch due");
                inner.switch_pending.store(true, Ordering::SeqCst);
            }
        }));
        info!(
            interval_secs = interval.as_secs(),
            account = tokens.current_index + 1,
            accounts = tokens.total,
            "account switch scheduled"
        );
    }

    /// Switch to the next account, retrying with the following key until
    /// the consecutive-error limit stops the automation.
    async fn perform_switch(self: &Arc<Self>) -> Result<()> {
        let _guard = self.switch_lock.lock().await;
        loop {
            match self.switch_once().await {
                Ok(()) => {
                    metrics::record_account_switch("success");
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    self.arm_switch_timer().await;
                    return Ok(());
                }
                Err(e) => {
                    metrics::record_account_switch("failure");
                    self.snapshot.write().await.last_error = Some(e.to_string());
                    let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                    if errors >= self.settings.max_consecutive_errors {
                        error!(error = %e, errors, "account switch failed repeatedly");
                        self.force_stop(REASON_ACCOUNT_ERRORS);
                        return Err(e);
                    }
                    warn!(error = %e, errors, "account switch failed, trying next account");
                }
            }
        }
    }

    async fn switch_once(&self) -> Result<()> {
        info!("switching to next account");
        self.auth.login(true).await?;
        self.refresh_account().await?;
        let thread_id = new_thread_id();
        debug!(thread_id = %thread_id, "new conversation thread");
        self.snapshot.write().await.thread_id = Some(thread_id);
        let tokens = self.auth.token_info().await;
        info!(
            account = tokens.current_index + 1,
            accounts = tokens.total,
            "account switch completed"
        );
        Ok(())
    }

    fn force_stop(&self, reason: &str) {
        let action = self.transition(AutomationEvent::ErrorLimitReached {
            reason: reason.to_string(),
        });
        if action == AutomationAction::CancelTimers {
            self.cancel_timers();
            self.switch_pending.store(false, Ordering::SeqCst);
            error!(reason, "automation stopped");
        }
    }

    async fn run_loop(self: Arc<Self>, run: u64) {
        info!(run, "send loop started");
        let poll = Duration::from_millis(self.settings.rate_limit_poll_ms);
        let error_cooldown = Duration::from_secs(self.settings.error_cooldown_secs);

        while self.is_active(run) {
            if let Some(remaining) = self.rate_limit.cooldown_remaining().await {
                debug!(remaining_secs = remaining, "rate limit cooldown active");
                tokio::time::sleep(poll).await;
                continue;
            }

            if self.switch_pending.swap(false, Ordering::SeqCst) {
                if let Err(e) = self.perform_switch().await {
                    warn!(error = %e, "scheduled account switch failed");
                }
                continue;
            }

            match self.send_next().await {
                Ok(()) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    let delay = self.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "waiting before next message");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.classification() == ErrorClassification::RateLimited => {
                    metrics::record_send_error(ErrorClassification::RateLimited.label());
                    warn!(error = %e, "rate limited, entering cooldown");
                    self.note_rate_limit().await;
                }
                Err(e) => {
                    let classification = e.classification();
                    metrics::record_send_error(classification.label());
                    self.snapshot.write().await.last_error = Some(e.to_string());
                    let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                    if errors >= self.settings.max_consecutive_errors {
                        error!(error = %e, errors, "too many consecutive errors");
                        self.force_stop(REASON_TOO_MANY_ERRORS);
                        break;
                    }
                    warn!(
                        error = %e,
                        classification = classification.label(),
                        errors,
                        "send failed"
                    );
                    tokio::time::sleep(error_cooldown).await;
                }
            }
        }
        info!(run, "send loop stopped");
    }

    async fn send_next(&self) -> Result<()> {
        let content = self.generator.generate().await?;
        let (thread_id, model) = {
            let snapshot = self.snapshot.read().await;
            (snapshot.thread_id.clone(), snapshot.model.clone())
        };
        let thread_id = thread_id.unwrap_or_else(new_thread_id);
        let model = model.unwrap_or_default();

        self.chat.send_message(&thread_id, &model, &content).await?;
        let sent = self.messages_sent.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_message_sent();
        info!(sent, thread_id = %thread_id, "message sent");
        Ok(())
    }

    /// Refresh the window after a rate-limited send so the cooldown gate
    /// engages; fall back to a fixed cooldown when the remote does not
    /// report one.
    async fn note_rate_limit(&self) {
        let now = self.rate_limit.now();
        let window = match self.chat.rate_limit(now).await {
            Ok(window) if window.is_cooldown_active_at(now) => window,
            Ok(_) => RateLimitWindow::exhausted_for(RATE_LIMIT_FALLBACK_SECS, now),
            Err(e) => {
                warn!(error = %e, "rate limit refresh failed");
                RateLimitWindow::exhausted_for(RATE_LIMIT_FALLBACK_SECS, now)
            }
        };
        self.rate_limit.record(window.clone()).await;
        self.snapshot.write().await.rate_limit = Some(window);
    }

    fn next_delay(&self) -> Duration {
        let min = self.settings.min_delay_ms;
        let max = self.settings.max_delay_ms.max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

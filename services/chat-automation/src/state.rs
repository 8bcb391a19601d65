//! Automation state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The scheduler executes the I/O implied by each action and is the only
//! owner of the state.
//!
//! `Starting` is transitional: it covers the login and snapshot fetch so a
//! second start request cannot race the first.

use serde::Serialize;

/// Automation states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutomationState {
    /// Never started
    Idle,
    /// Login and account snapshot in progress
    Starting,
    /// Send loop active
    Running,
    /// Stopped by the operator; timers cancelled, tokens kept
    Paused,
    /// Stopped by the scheduler; requires a manual start
    Stopped { reason: String },
}

impl AutomationState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AutomationState::Idle => "idle",
            AutomationState::Starting => "starting",
            AutomationState::Running => "running",
            AutomationState::Paused => "paused",
            AutomationState::Stopped { .. } => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AutomationState::Running)
    }
}

/// Events that drive state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationEvent {
    /// Operator asked to start or resume
    StartRequested,
    /// Login, snapshots and thread set up
    Started,
    /// Start failed; transient failures get one delayed restart
    StartFailed { reason: String, transient: bool },
    /// Operator asked to pause
    PauseRequested,
    /// Too many consecutive send or switch failures
    ErrorLimitReached { reason: String },
    /// Auto-restart delay expired
    RestartTimer,
}

/// Actions the scheduler should execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationAction {
    /// Cancel pending timers, log in, fetch snapshots
    BeginStart,
    /// Arm the switch timer and spawn the send loop
    EnterLoop,
    /// Arm the auto-restart timer
    ScheduleRestart,
    /// Cancel the switch and restart timers
    CancelTimers,
    /// No-op (transition not valid from the current state)
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: AutomationState,
    event: AutomationEvent,
) -> (AutomationState, AutomationAction) {
    match (state, event) {
        // --- Start / resume ---
        (
            AutomationState::Idle | AutomationState::Paused | AutomationState::Stopped { .. },
            AutomationEvent::StartRequested | AutomationEvent::RestartTimer,
        ) => (AutomationState::Starting, AutomationAction::BeginStart),

        // --- Starting ---
        (AutomationState::Starting, AutomationEvent::Started) => {
            (AutomationState::Running, AutomationAction::EnterLoop)
        }

        (AutomationState::Starting, AutomationEvent::StartFailed { reason, transient }) => {
            let action = if transient {
                AutomationAction::ScheduleRestart
            } else {
                AutomationAction::None
            };
            (AutomationState::Stopped { reason }, action)
        }

        // --- Running ---
        (AutomationState::Running, AutomationEvent::PauseRequested) => {
            (AutomationState::Paused, AutomationAction::CancelTimers)
        }

        (AutomationState::Running, AutomationEvent::ErrorLimitReached { reason }) => {
            (AutomationState::Stopped { reason }, AutomationAction::CancelTimers)
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, AutomationAction::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(reason: &str) -> AutomationState {
        AutomationState::Stopped {
            reason: reason.into(),
        }
    }

    #[test]
    fn start_from_idle_paused_or_stopped() {
        for state in [AutomationState::Idle, AutomationState::Paused, stopped("too many errors")] {
            let (next, action) = handle_event(state, AutomationEvent::StartRequested);
            assert_eq!(next, AutomationState::Starting);
            assert_eq!(action, AutomationAction::BeginStart);
        }
    }

    #[test]
    fn start_while_running_or_starting_is_noop() {
        for state in [AutomationState::Running, AutomationState::Starting] {
            let (next, action) = handle_event(state.clone(), AutomationEvent::StartRequested);
            assert_eq!(next, state);
            assert_eq!(action, AutomationAction::None);
        }
    }

    #[test]
    fn started_enters_loop() {
        let (next, action) = handle_event(AutomationState::Starting, AutomationEvent::Started);
        assert_eq!(next, AutomationState::Running);
        assert_eq!(action, AutomationAction::EnterLoop);
    }

    #[test]
    fn transient_start_failure_schedules_restart() {
        let (next, action) = handle_event(
            AutomationState::Starting,
            AutomationEvent::StartFailed {
                reason: "connection refused".into(),
                transient: true,
            },
        );
        assert_eq!(next, stopped("connection refused"));
        assert_eq!(action, AutomationAction::ScheduleRestart);
    }

    #[test]
    fn fatal_start_failure_just_stops() {
        let (next, action) = handle_event(
            AutomationState::Starting,
            AutomationEvent::StartFailed {
                reason: "no private keys available".into(),
                transient: false,
            },
        );
        assert_eq!(next, stopped("no private keys available"));
        assert_eq!(action, AutomationAction::None);
    }

    #[test]
    fn pause_only_from_running() {
        let (next, action) = handle_event(AutomationState::Running, AutomationEvent::PauseRequested);
        assert_eq!(next, AutomationState::Paused);
        assert_eq!(action, AutomationAction::CancelTimers);

        for state in [AutomationState::Idle, AutomationState::Paused, stopped("x")] {
            let (next, action) = handle_event(state.clone(), AutomationEvent::PauseRequested);
            assert_eq!(next, state);
            assert_eq!(action, AutomationAction::None);
        }
    }

    #[test]
    fn error_limit_stops_with_reason() {
        let (next, action) = handle_event(
            AutomationState::Running,
            AutomationEvent::ErrorLimitReached {
                reason: "too many errors".into(),
            },
        );
        assert_eq!(next, stopped("too many errors"));
        assert_eq!(action, AutomationAction::CancelTimers);
    }

    #[test]
    fn restart_timer_ignored_once_running() {
        let (next, action) = handle_event(AutomationState::Running, AutomationEvent::RestartTimer);
        assert_eq!(next, AutomationState::Running);
        assert_eq!(action, AutomationAction::None);

        let (next, action) = handle_event(stopped("timeout"), AutomationEvent::RestartTimer);
        assert_eq!(next, AutomationState::Starting);
        assert_eq!(action, AutomationAction::BeginStart);
    }

    #[test]
    fn labels() {
        assert_eq!(AutomationState::Idle.label(), "idle");
        assert_eq!(stopped("x").label(), "stopped");
        assert!(AutomationState::Running.is_running());
        assert!(!AutomationState::Paused.is_running());
    }
}

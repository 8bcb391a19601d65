//! Prometheus metrics exposition
//!
//! - `automation_messages_sent_total` (counter)
//! - `automation_send_errors_total` (counter): label `classification`
//! - `automation_account_switches_total` (counter): label `outcome`
//! - `automation_running` (gauge): 1 while the send loop is active
//!
//! Retry transitions are counted by `session_engine::LoggingObserver` as
//! `retry_events_total` with a `kind` label.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_message_sent() {
    metrics::counter!("automation_messages_sent_total").increment(1);
}

/// Record a failed send with its classification label.
pub fn record_send_error(classification: &str) {
    metrics::counter!("automation_send_errors_total", "classification" => classification.to_string())
        .increment(1);
}

/// Record an account switch attempt (`success` or `failure`).
pub fn record_account_switch(outcome: &str) {
    metrics::counter!("automation_account_switches_total", "outcome" => outcome.to_string())
        .increment(1);
}

pub fn set_running(running: bool) {
    metrics::gauge!("automation_running").set(if running { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_message_sent();
        record_send_error("transient");
        record_account_switch("success");
        set_running(true);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_message_sent();
        record_message_sent();
        record_send_error("rate_limited");
        record_account_switch("failure");

        let output = handle.render();
        assert!(output.contains("automation_messages_sent_total 2"), "got:\n{output}");
        assert!(output.contains("classification=\"rate_limited\""));
        assert!(output.contains("outcome=\"failure\""));
    }

    #[test]
    fn running_gauge_toggles() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        set_running(true);
        assert!(handle.render().contains("automation_running 1"));
        set_running(false);
        assert!(handle.render().contains("automation_running 0"));
    }
}

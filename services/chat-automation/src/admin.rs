//! Control API
//!
//! Local HTTP surface over the command table. Bound to loopback by default.
//!
//! Endpoints:
//! - GET  /health               : liveness, automation state, uptime
//! - GET  /metrics              : Prometheus text exposition
//! - GET  /automation/status    : state, token info, account snapshot
//! - GET  /automation/commands  : available commands and aliases
//! - POST /automation/{command} : run a command (start, pause, resume, switch, verify)

use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use crate::commands::{self, COMMANDS};
use crate::error::Error;
use crate::scheduler::Scheduler;

/// Shared state for control API handlers.
#[derive(Clone)]
pub struct AdminState {
    scheduler: Scheduler,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl AdminState {
    pub fn new(scheduler: Scheduler, prometheus: PrometheusHandle) -> Self {
        Self {
            scheduler,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the control router. `max_connections` caps concurrent requests.
pub fn build_router(state: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/automation/status", get(status_handler))
        .route("/automation/commands", get(commands_handler))
        .route("/automation/{command}", post(command_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> impl IntoResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /health: always 200 while the process serves requests.
async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let status = state.scheduler.status().await;
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "ok",
            "automation": status.state,
            "accounts": status.tokens.total,
            "messages_sent": status.messages_sent,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn status_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let status = state.scheduler.status().await;
    json_response(
        StatusCode::OK,
        serde_json::to_value(status).unwrap_or_default(),
    )
}

async fn commands_handler() -> impl IntoResponse {
    let commands: Vec<_> = COMMANDS
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "aliases": c.aliases,
                "description": c.description,
            })
        })
        .collect();
    json_response(StatusCode::OK, serde_json::json!({ "commands": commands }))
}

/// POST /automation/{command}: dispatch through the command table.
///
/// 404 unknown command, 409 wrong state for the command, 502 when the
/// remote side failed.
async fn command_handler(
    State(state): State<AdminState>,
    Path(command): Path<String>,
) -> impl IntoResponse {
    match commands::dispatch(&state.scheduler, &command).await {
        Ok(output) => json_response(
            StatusCode::OK,
            serde_json::to_value(output).unwrap_or_default(),
        ),
        Err(e) => {
            let status = match &e {
                Error::UnknownCommand(_) => StatusCode::NOT_FOUND,
                Error::AlreadyRunning | Error::NotRunning => StatusCode::CONFLICT,
                Error::Engine(_) | Error::Generator(_) => StatusCode::BAD_GATEWAY,
            };
            warn!(command = %command, error = %e, "command failed");
            json_response(
                status,
                serde_json::json!({
                    "error": e.to_string(),
                    "classification": e.classification().label(),
                }),
            )
        }
    }
}

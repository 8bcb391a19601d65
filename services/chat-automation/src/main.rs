//! Multi-account chat automation
//!
//! Single-binary service that:
//! 1. Signs in to the chat service with private keys from a flat file
//! 2. Sends generated messages on a randomized cadence, holding off while
//!    the account's rate-limit window is exhausted
//! 3. Rotates accounts on a fixed interval and recovers from auth and
//!    network failures through session-token and proxy rotation
//! 4. Exposes a local control API (commands, status, health, metrics)

mod admin;
mod chat;
mod commands;
mod config;
mod error;
mod generator;
mod metrics;
mod scheduler;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chat_api::{HttpTransport, ProxyRotator};
use chat_auth::{CredentialStore, SessionRegistry};
use session_engine::{AuthService, RateLimitTracker, RetryExecutor};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::AdminState;
use crate::config::Config;
use crate::generator::CompletionGenerator;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting chat-automation");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();
    metrics::set_running(false);

    let args: Vec<String> = std::env::args().collect();
    let (config_path, explicit) = Config::resolve_path(cli_config_path(&args));

    let mut config = if explicit || config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "no configuration file, using defaults");
        Config::from_defaults().context("failed to resolve default configuration")?
    };

    info!(
        api_base_url = %config.api.base_url,
        listen_addr = %config.control.listen_addr,
        private_keys = %config.files.private_keys.display(),
        session_tokens = %config.files.session_tokens.display(),
        proxies = %config.files.proxies.display(),
        headers = config.headers.len(),
        "configuration loaded"
    );

    let api_key = config.generator.api_key.take().context(
        "no generator API key: set GENERATOR_API_KEY or point generator.api_key_file at a key file",
    )?;

    let timeout = Duration::from_secs(config.api.timeout_secs);
    let proxies = Arc::new(ProxyRotator::from_file(config.files.proxies.clone(), timeout));
    let transport = Arc::new(
        HttpTransport::new(
            &config.api.base_url,
            timeout,
            proxies.clone(),
            config.headers.clone(),
        )
        .context("failed to build HTTP transport")?,
    );

    let credentials = Arc::new(CredentialStore::from_file(config.files.private_keys.clone()));
    let registry = Arc::new(SessionRegistry::from_file(
        config.files.session_tokens.clone(),
    ));
    let executor = Arc::new(RetryExecutor::new(
        registry.clone(),
        proxies,
        config.retry.policy(),
    ));
    let auth = Arc::new(
        AuthService::new(transport, credentials, registry, executor)
            .with_verify_concurrency(config.automation.verify_concurrency),
    );

    let generator = Arc::new(
        CompletionGenerator::new(
            &config.generator.base_url,
            &config.generator.model,
            api_key,
            timeout,
        )
        .context("failed to build content generator")?,
    );

    let scheduler = Scheduler::new(
        auth,
        generator,
        Arc::new(RateLimitTracker::new()),
        config.automation.clone(),
    );

    if config.automation.verify_on_startup
        && let Err(e) = scheduler.verify_tokens().await
    {
        warn!(error = %e, "startup token verification failed");
    }

    if config.automation.auto_start {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            // Failures are logged and, when transient, rescheduled by the scheduler.
            let _ = scheduler.start().await;
        });
    }

    let app = admin::build_router(
        AdminState::new(scheduler.clone(), prometheus_handle),
        config.control.max_connections,
    );

    let listen_addr = config.control.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "control API listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "control API server error");
    }

    if scheduler.is_running() && scheduler.pause().is_ok() {
        info!("automation paused for shutdown");
    }
    metrics::set_running(false);

    info!(automation = scheduler.state().label(), "shutdown complete");
    Ok(())
}

/// Value following `--config`, if any.
fn cli_config_path(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn config_flag_takes_next_argument() {
        let argv = args(&["chat-automation", "--config", "/etc/chat.toml"]);
        assert_eq!(cli_config_path(&argv), Some("/etc/chat.toml"));
    }

    #[test]
    fn missing_config_flag_or_value() {
        assert_eq!(cli_config_path(&args(&["chat-automation"])), None);
        assert_eq!(cli_config_path(&args(&["chat-automation", "--config"])), None);
    }
}

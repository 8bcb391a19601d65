//! Verification sweep over all known session tokens
//!
//! Probes every token with bounded concurrency, collects all verdicts, and
//! only then swaps the registry contents for the valid tokens in their
//! original order. Readers see either the full old list or the full new one.

use std::future::Future;

use chat_auth::SessionRegistry;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub valid: usize,
}

/// Probe each token (at most `workers` at once) and keep only live ones.
///
/// An empty registry is left untouched.
pub async fn sweep<P, Fut>(registry: &SessionRegistry, workers: usize, probe: P) -> Result<SweepReport>
where
    P: Fn(String) -> Fut,
    Fut: Future<Output = bool>,
{
    let tokens = registry.tokens().await;
    if tokens.is_empty() {
        warn!("no session tokens to verify");
        return Ok(SweepReport { total: 0, valid: 0 });
    }

    let total = tokens.len();
    info!(total, workers, "verifying session tokens");

    let verdicts: Vec<bool> = stream::iter(tokens.iter().cloned().map(&probe))
        .buffered(workers.max(1))
        .collect()
        .await;

    let valid: Vec<String> = tokens
        .into_iter()
        .zip(verdicts)
        .enumerate()
        .filter_map(|(index, (token, ok))| {
            if ok {
                Some(token)
            } else {
                warn!(account = index + 1, total, token = %common::fingerprint(&token), "session token invalid or expired");
                None
            }
        })
        .collect();

    let report = SweepReport {
        total,
        valid: valid.len(),
    };
    registry.replace_all(valid).await?;
    info!(valid = report.valid, total, "token verification complete");
    Ok(report)
}

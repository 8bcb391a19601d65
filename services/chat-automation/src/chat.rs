//! Account-scoped calls on the remote chat service
//!
//! Thin typed layer over `AuthService::request`: points, rate-limit window,
//! model listing, and message send. Thread ids are generated locally; the
//! remote creates the thread on the first message that names it.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use session_engine::{AuthService, RateLimitWindow};
use tracing::debug;

use crate::error::Result;

pub const POINTS_PATH: &str = "/points";
pub const RATE_LIMIT_PATH: &str = "/rate-limit";
pub const MODELS_PATH: &str = "/models";
pub const CHAT_PATH: &str = "/chat";

/// Points balance of the current account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Points {
    #[serde(default)]
    pub total_points: f64,
    #[serde(default)]
    pub points: PointsBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    #[serde(default)]
    pub inference: f64,
    #[serde(default)]
    pub referral: f64,
}

/// A model offered by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Model to chat with: the one flagged default, else the first listed.
pub fn select_default_model(models: &[Model]) -> Option<&Model> {
    models.iter().find(|m| m.is_default).or_else(|| models.first())
}

/// Fresh conversation thread id.
pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Typed client for account-scoped endpoints.
#[derive(Clone)]
pub struct ChatClient {
    auth: Arc<AuthService>,
}

impl ChatClient {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }

    pub async fn points(&self) -> Result<Points> {
        let response = self.auth.request(Method::GET, POINTS_PATH, None, &[]).await?;
        serde_json::from_value(response).map_err(|e| {
            session_engine::Error::InvalidResponse(format!("points: {e}")).into()
        })
    }

    /// Current quota window, reset time converted against `now`.
    pub async fn rate_limit(&self, now: u64) -> Result<RateLimitWindow> {
        let response = self
            .auth
            .request(Method::GET, RATE_LIMIT_PATH, None, &[])
            .await?;
        Ok(RateLimitWindow::from_response(&response, now)?)
    }

    pub async fn models(&self) -> Result<Vec<Model>> {
        let response = self.auth.request(Method::GET, MODELS_PATH, None, &[]).await?;
        let list = match response {
            serde_json::Value::Array(_) => response,
            serde_json::Value::Object(mut map) => map
                .remove("models")
                .or_else(|| map.remove("data"))
                .unwrap_or(serde_json::Value::Array(Vec::new())),
            _ => serde_json::Value::Array(Vec::new()),
        };
        serde_json::from_value(list).map_err(|e| {
            session_engine::Error::InvalidResponse(format!("models: {e}")).into()
        })
    }

    /// Post one user message to `thread_id`.
    pub async fn send_message(&self, thread_id: &str, model: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({
            "id": thread_id,
            "title": "",
            "messages": [{"role": "user", "content": content}],
            "sources": [],
            "model": model,
            "language": "english",
        });
        self.auth
            .request(Method::POST, CHAT_PATH, Some(body), &[])
            .await?;
        debug!(thread_id, model, chars = content.len(), "message sent");
        Ok(())
    }
}

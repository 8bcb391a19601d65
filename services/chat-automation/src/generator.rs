//! Chat content generation
//!
//! The send loop only needs "give me the next message". `ContentGenerator`
//! is that seam; `CompletionGenerator` implements it against an
//! OpenAI-compatible `/chat/completions` endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Future returned by `ContentGenerator::generate`.
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Produces the text of the next chat message.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility (`Arc<dyn ContentGenerator>`).
pub trait ContentGenerator: Send + Sync {
    fn generate(&self) -> GenerateFuture<'_>;
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Generate a natural and engaging question or comment that a user might ask in a chat conversation. The message should be concise (1-2 sentences) and encourage further discussion.";

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Generator backed by an OpenAI-compatible completion API.
pub struct CompletionGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Secret<String>,
}

impl CompletionGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Generator(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    async fn complete(&self) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "system", "content": SYSTEM_PROMPT}],
            "temperature": 0.7,
            "max_tokens": 100,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generator(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generator(format!("provider returned {status}: {text}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Generator(format!("invalid completion response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Generator("completion has no content".into()))?;

        debug!(chars = content.len(), "generated message");
        Ok(content)
    }
}

impl ContentGenerator for CompletionGenerator {
    fn generate(&self) -> GenerateFuture<'_> {
        Box::pin(self.complete())
    }
}

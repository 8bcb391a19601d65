//! reqwest-backed `Transport`
//!
//! Resolves the request path against the base URL, picks the proxy adapter
//! for the target (or the direct client), applies headers and the fixed
//! per-request timeout, and decodes the JSON response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{ApiError, Result};
use crate::headers::{HeaderInjection, build_headers, redacted};
use crate::proxy::ProxyRotator;
use crate::{ApiRequest, Transport};

/// HTTP transport for the remote chat service.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    proxies: Arc<ProxyRotator>,
    injections: Vec<HeaderInjection>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        proxies: Arc<ProxyRotator>,
        injections: Vec<HeaderInjection>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            proxies,
            injections,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn send_inner(&self, request: &ApiRequest) -> Result<serde_json::Value> {
        let url = self.url_for(&request.path);
        let headers = build_headers(&self.injections, &request.headers, &request.credential)?;

        let client = match self.proxies.adapter_for(&url).await? {
            Some(adapter) => adapter.client,
            None => self.client.clone(),
        };

        debug!(url = %url, headers = ?redacted(&headers), has_body = request.body.is_some(), "API request");

        let mut builder = client
            .request(request.method.clone(), &url)
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from_reqwest)?;

        debug!(status = status.as_u16(), bytes = text.len(), "API response");

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{} {}: {e}", request.method, request.path)))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.send_inner(request))
    }
}

//! Configuration types and loading
//!
//! The file is located by `--config`, then CONFIG_PATH, then
//! `chat-automation.toml`; every setting comes from that file or its default.
//! Every section is optional. The only environment overlay is the generator
//! API key: GENERATOR_API_KEY wins over `api_key_file`, and the key is never
//! stored in the TOML directly.

use chat_api::HeaderInjection;
use common::{InputFile, Secret};
use serde::Deserialize;
use session_engine::RetryPolicy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub files: FilesConfig,
    pub retry: RetryConfig,
    pub automation: AutomationConfig,
    pub generator: GeneratorConfig,
    pub control: ControlConfig,
    pub headers: Vec<HeaderInjection>,
}

/// Remote chat service
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api1-pp.klokapp.ai/v1".into(),
            timeout_secs: 10,
        }
    }
}

/// Flat files holding keys, tokens and proxies
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub private_keys: PathBuf,
    pub session_tokens: PathBuf,
    pub proxies: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            private_keys: PathBuf::from("priv.txt"),
            session_tokens: PathBuf::from("session-token.key"),
            proxies: PathBuf::from("proxies.txt"),
        }
    }
}

/// Backoff for transient failures
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2000,
            multiplier: 1.5,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Send loop and scheduler timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub switch_interval_secs: u64,
    pub max_consecutive_errors: u32,
    pub error_cooldown_secs: u64,
    pub rate_limit_poll_ms: u64,
    pub restart_delay_secs: u64,
    pub auto_start: bool,
    pub verify_on_startup: bool,
    pub verify_concurrency: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 5000,
            max_delay_ms: 15000,
            switch_interval_secs: 600,
            max_consecutive_errors: 3,
            error_cooldown_secs: 5,
            rate_limit_poll_ms: 1000,
            restart_delay_secs: 10,
            auto_start: true,
            verify_on_startup: false,
            verify_concurrency: 20,
        }
    }
}

/// OpenAI-compatible completion endpoint producing the chat messages
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    /// Path to a file containing the API key (alternative to GENERATOR_API_KEY)
    pub api_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "mixtral-8x7b-32768".into(),
            api_key_file: Some(PathBuf::from("groq-api.key")),
            api_key: None,
        }
    }
}

/// Local control API
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            max_connections: 64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| common::Error::read(InputFile::Config, path, e))?;
        Self::parse(&contents)
    }

    /// Defaults only, with secrets resolved from the environment.
    pub fn from_defaults() -> common::Result<Self> {
        Self::parse("")
    }

    fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;

        // Resolve API key: env var takes precedence over file
        if let Ok(key) = std::env::var("GENERATOR_API_KEY") {
            config.generator.api_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.generator.api_key_file {
            match std::fs::read_to_string(key_file) {
                Ok(key) => {
                    let key = key.trim().to_owned();
                    if !key.is_empty() {
                        config.generator.api_key = Some(Secret::new(key));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(common::Error::read(InputFile::GeneratorKey, key_file, e));
                }
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api.base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return Err(common::Error::Config(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        let automation = &self.automation;
        if automation.min_delay_ms > automation.max_delay_ms {
            return Err(common::Error::Config(format!(
                "automation.min_delay_ms ({}) must not exceed max_delay_ms ({})",
                automation.min_delay_ms, automation.max_delay_ms
            )));
        }
        if automation.max_consecutive_errors == 0 {
            return Err(common::Error::Config(
                "automation.max_consecutive_errors must be greater than 0".into(),
            ));
        }
        if automation.switch_interval_secs == 0 {
            return Err(common::Error::Config(
                "automation.switch_interval_secs must be greater than 0".into(),
            ));
        }
        if automation.rate_limit_poll_ms == 0 {
            return Err(common::Error::Config(
                "automation.rate_limit_poll_ms must be greater than 0".into(),
            ));
        }
        if automation.verify_concurrency == 0 {
            return Err(common::Error::Config(
                "automation.verify_concurrency must be greater than 0".into(),
            ));
        }
        if self.control.max_connections == 0 {
            return Err(common::Error::Config(
                "control.max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag reports whether the path was given explicitly; only an
    /// explicit path is required to exist.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from("chat-automation.toml"), false)
    }
}

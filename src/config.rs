//! Runtime configuration.
//!
//! The API key lives only in memory. `Config`'s `Debug` output redacts it, so
//! the struct can be logged as a whole.

use std::fmt;
use std::time::Duration;

use crate::extract::ContextWindow;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const INSECURE_SSL_ENV: &str = "ALT_TEXT_INSECURE_SSL";

pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 150;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; WCAGAltTextBot/1.0)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
}

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    /// Messages API root, without the `/v1/messages` path.
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Extra attempts after a retryable failure (transport error, 429, 5xx).
    pub max_retries: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    pub context: ContextWindow,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            context: ContextWindow::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }

    /// Build configuration from the process environment.
    ///
    /// Only the binary calls this; library code takes a `Config` explicitly.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Ok(base) = std::env::var(API_BASE_URL_ENV) {
            if !base.trim().is_empty() {
                config.api_base_url = base.trim().to_string();
            }
        }
        config.accept_invalid_certs = std::env::var(INSECURE_SSL_ENV).as_deref() == Ok("1");
        Ok(config)
    }

    pub fn messages_endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("request_timeout", &self.request_timeout)
            .field("context", &self.context)
            .field("user_agent", &self.user_agent)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

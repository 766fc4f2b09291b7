use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash";

/// Settings for the outbound chat-completion calls.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer credential. Analysis fails with a configuration error while this is unset.
    pub api_key: Option<String>,
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    /// Extra attempts after a transport failure. HTTP error responses are never retried.
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_GATEWAY_MODEL.to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub image_dir: PathBuf,
    pub public_base_url: String,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values are treated like missing ones
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let defaults = GatewayConfig::default();
        let timeout_secs = match get("AI_GATEWAY_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("AI_GATEWAY_TIMEOUT_SECS is not a number: {}", v))?,
            None => defaults.timeout.as_secs(),
        };
        let max_retries = match get("AI_GATEWAY_MAX_RETRIES") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .with_context(|| format!("AI_GATEWAY_MAX_RETRIES is not a number: {}", v))?,
            None => defaults.max_retries,
        };

        let gateway = GatewayConfig {
            api_key: get("AI_GATEWAY_API_KEY"),
            url: get("AI_GATEWAY_URL").unwrap_or(defaults.url),
            model: get("AI_GATEWAY_MODEL").unwrap_or(defaults.model),
            temperature: defaults.temperature,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        };

        Ok(Self {
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            image_dir: PathBuf::from(get("IMAGE_DIR").unwrap_or_else(|| "./data/images".to_string())),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            gateway,
        })
    }
}

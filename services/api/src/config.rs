use secrecy::SecretString;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::Level;

pub const DEFAULT_UPSTREAM_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";

/// Username reported for tokens configured without one.
const DEFAULT_USERNAME: &str = "user";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub upstream_url: String,
    /// Accepted client tokens, mapped to the username they belong to.
    pub api_tokens: HashMap<String, String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8001".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let upstream_url = std::env::var("REALTIME_UPSTREAM_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string());
        if !(upstream_url.starts_with("wss://") || upstream_url.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue(
                "REALTIME_UPSTREAM_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", upstream_url),
            ));
        }

        let api_tokens = parse_tokens(&std::env::var("API_TOKENS").unwrap_or_default())?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            upstream_url,
            api_tokens,
            log_level,
        })
    }
}

/// Parses `token[:username],...`.
pub fn parse_tokens(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (token, username) = match entry.split_once(':') {
            Some((token, username)) => (token.trim(), username.trim()),
            None => (entry, DEFAULT_USERNAME),
        };
        if token.is_empty() {
            return Err(ConfigError::InvalidValue(
                "API_TOKENS".to_string(),
                format!("entry '{}' has an empty token", entry),
            ));
        }
        let username = if username.is_empty() {
            DEFAULT_USERNAME
        } else {
            username
        };
        tokens.insert(token.to_string(), username.to_string());
    }
    Ok(tokens)
}

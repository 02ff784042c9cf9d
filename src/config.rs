use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;

use crate::error::AppError;
use crate::services::session::DEFAULT_SESSION_IDLE;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
/// Value shipped in the sample `.env`; treated the same as an unset key.
pub const PLACEHOLDER_API_KEY: &str = "your_claude_api_key_here";

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub model: String,
    pub api_base_url: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub session_idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 1500,
            request_timeout: Duration::from_secs(120),
            session_idle_timeout: DEFAULT_SESSION_IDLE,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            bind_addr: env_or("SALES_INSIGHTS_ADDR", defaults.bind_addr)?,
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
            model: std::env::var("ANTHROPIC_MODEL").unwrap_or(defaults.model),
            api_base_url: std::env::var("ANTHROPIC_BASE_URL").unwrap_or(defaults.api_base_url),
            max_tokens: env_or("ANTHROPIC_MAX_TOKENS", defaults.max_tokens)?,
            request_timeout: Duration::from_secs(env_or(
                "ANTHROPIC_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            session_idle_timeout: Duration::from_secs(env_or(
                "SESSION_IDLE_SECS",
                defaults.session_idle_timeout.as_secs(),
            )?),
        })
    }
}

pub fn load_config() -> Result<Config> {
    let config = Config::new()?;
    tracing::info!(
        "Configuration loaded: addr={}, model={}, max_file_size={}",
        config.bind_addr,
        config.model,
        config.max_file_size
    );
    Ok(config)
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Reads the API key at call time so a key added to the environment after
/// startup is picked up without a restart.
pub fn api_key_from_env() -> Result<Secret<String>, AppError> {
    check_api_key(std::env::var(API_KEY_VAR).ok())
}

pub fn check_api_key(raw: Option<String>) -> Result<Secret<String>, AppError> {
    match raw.map(|k| k.trim().to_string()) {
        Some(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY => Ok(Secret::new(key)),
        _ => Err(AppError::MissingCredential(API_KEY_VAR.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn missing_or_placeholder_key_is_a_credential_error() {
        assert!(matches!(check_api_key(None), Err(AppError::MissingCredential(_))));
        assert!(matches!(check_api_key(Some("  ".into())), Err(AppError::MissingCredential(_))));
        assert!(matches!(
            check_api_key(Some(PLACEHOLDER_API_KEY.into())),
            Err(AppError::MissingCredential(_))
        ));
    }

    #[test]
    fn real_key_is_accepted_and_trimmed() {
        let key = check_api_key(Some(" sk-ant-123 \n".into())).unwrap();
        assert_eq!(key.expose_secret(), "sk-ant-123");
    }

    #[test]
    fn defaults_match_upload_ceiling() {
        let config = Config::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.max_tokens, 1500);
    }
}

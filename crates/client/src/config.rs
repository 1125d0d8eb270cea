//! Client configuration

use std::env;
use std::time::Duration;

use url::Url;

use crate::realtime::{ReconnectPolicy, TransportKind};

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Endpoints
    pub realtime_url: Url,
    pub api_base_url: Url,

    // Authentication
    pub access_token: Option<String>,

    // Realtime
    pub reconnect_delay_ms: u64,
    pub reconnect_attempts: u32,
    pub handshake_timeout_ms: u64,
    pub transports: Vec<TransportKind>,

    // REST
    pub http_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Endpoints
            realtime_url: required_url("REALTIME_URL")?,
            api_base_url: required_url("API_BASE_URL")?,

            // Authentication
            access_token: env::var("ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),

            // Realtime
            reconnect_delay_ms: parse_var("RECONNECT_DELAY_MS", 1000)?,
            reconnect_attempts: parse_var("RECONNECT_ATTEMPTS", 5)?,
            handshake_timeout_ms: parse_var("HANDSHAKE_TIMEOUT_MS", 20000)?,
            transports: {
                let raw = env::var("REALTIME_TRANSPORTS")
                    .unwrap_or_else(|_| "websocket,polling".to_string());
                let transports = raw
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(str::parse::<TransportKind>)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ConfigError::Invalid("REALTIME_TRANSPORTS", e))?;
                if transports.is_empty() {
                    return Err(ConfigError::Invalid(
                        "REALTIME_TRANSPORTS",
                        "at least one transport is required".to_string(),
                    ));
                }
                transports
            },

            // REST
            http_timeout_ms: parse_var("HTTP_TIMEOUT_MS", 30000)?,
        })
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            ..ReconnectPolicy::from_time_unit(Duration::from_millis(self.reconnect_delay_ms))
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn required_url(name: &'static str) -> Result<Url, ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    Url::parse(&raw).map_err(|e| ConfigError::Invalid(name, e.to_string()))
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

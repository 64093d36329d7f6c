//! Configuration for the relayer.

use std::str::FromStr;
use std::time::Duration;

/// Relayer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Frames buffered per connection before it is dropped as a slow consumer.
    pub outbound_queue_capacity: usize,
    pub ping_interval: Duration,
    /// Upper bound on sending the final close frame to a peer.
    pub close_timeout: Duration,
    pub jwt_secret: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
}

/// Invalid environment value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn non_zero(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}

fn random_secret() -> String {
    (0..32)
        .map(|_| rand::random::<u8>())
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_or("PORT", 8080u16)?;
        let request_timeout_secs = non_zero(
            "REQUEST_TIMEOUT_SECS",
            env_or("REQUEST_TIMEOUT_SECS", 10u64)?,
        )?;
        let max_message_size = non_zero(
            "MAX_MESSAGE_SIZE",
            env_or("MAX_MESSAGE_SIZE", 64 * 1024u64)?,
        )? as usize;
        let outbound_queue_capacity = non_zero(
            "OUTBOUND_QUEUE_CAPACITY",
            env_or("OUTBOUND_QUEUE_CAPACITY", 64u64)?,
        )? as usize;
        let ping_interval_secs =
            non_zero("PING_INTERVAL_SECS", env_or("PING_INTERVAL_SECS", 30u64)?)?;
        let close_timeout_secs =
            non_zero("CLOSE_TIMEOUT_SECS", env_or("CLOSE_TIMEOUT_SECS", 5u64)?)?;
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using a random per-process secret");
                random_secret()
            }
        };
        let access_token_ttl_secs = env_or("ACCESS_TOKEN_TTL_SECS", 15 * 60u64)?;
        let refresh_token_ttl_secs = env_or("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60u64)?;

        Ok(Self {
            host,
            port,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_message_size,
            outbound_queue_capacity,
            ping_interval: Duration::from_secs(ping_interval_secs),
            close_timeout: Duration::from_secs(close_timeout_secs),
            jwt_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
        })
    }

    /// Loopback config on an ephemeral port.
    pub fn for_test(jwt_secret: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(5),
            max_message_size: 64 * 1024,
            outbound_queue_capacity: 16,
            ping_interval: Duration::from_secs(30),
            close_timeout: Duration::from_secs(1),
            jwt_secret: jwt_secret.to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 3600,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

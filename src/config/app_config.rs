use crate::event::{QueueConfig, RetryPolicy};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Shared secret expected in `X-Gitlab-Token`; None disables the check
    pub webhook_secret: Option<String>,
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = QueueConfig::default();

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = parse_or(&lookup, "SERVER_PORT", 8080)?;

        let webhook_secret = lookup("GITLAB_WEBHOOK_SECRET").filter(|s| !s.is_empty());
        if webhook_secret.is_none() {
            tracing::warn!(
                "GITLAB_WEBHOOK_SECRET is not set; incoming webhooks are accepted without token verification"
            );
        }

        let lane_capacity = match parse_or(&lookup, "EVENT_QUEUE_CAPACITY", 0usize)? {
            0 => None,
            capacity => Some(capacity),
        };

        let queue = QueueConfig {
            worker_count: parse_or(&lookup, "EVENT_WORKERS", defaults.worker_count)?,
            max_retries: parse_or(&lookup, "EVENT_MAX_RETRIES", defaults.max_retries)?,
            history_capacity: parse_or(
                &lookup,
                "EVENT_HISTORY_CAPACITY",
                defaults.history_capacity,
            )?,
            history_ttl: Duration::from_secs(parse_or(
                &lookup,
                "EVENT_HISTORY_TTL_SECS",
                defaults.history_ttl.as_secs(),
            )?),
            lane_capacity,
            dispatch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "EVENT_DISPATCH_TIMEOUT_SECS",
                defaults.dispatch_timeout.as_secs(),
            )?),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "EVENT_RETRY_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
                max_delay: Duration::from_secs(parse_or(
                    &lookup,
                    "EVENT_RETRY_MAX_DELAY_SECS",
                    defaults.retry.max_delay.as_secs(),
                )?),
            },
            ..defaults
        };

        Ok(Self {
            server_host,
            server_port,
            webhook_secret,
            queue,
        })
    }

    /// `host:port` string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
        }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

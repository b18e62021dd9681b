use std::time::Duration;

use crate::error::{AppError, Result};

pub const NHL_WEB_API_URL: &str = "https://api-web.nhle.com/v1";

/// Base URL the terminal client polls when `API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Live poll interval (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// How long the initial-render snapshot is served before it is re-fetched (seconds).
pub const SNAPSHOT_REVALIDATE_SECS: u64 = 60;

/// Season id used by the team-stat and leader reads, e.g. `20252026`.
pub const CURRENT_SEASON: &str = "20252026";

/// Capacity of the poller's command and result channels.
pub const CHANNEL_CAPACITY: usize = 64;

/// Server-side configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub nhl_api_url: String,
    pub log_level: String,
    pub api_host: String,
    pub api_port: u16,
    /// Revalidation window of the cached snapshot (SNAPSHOT_REVALIDATE_SECS)
    pub snapshot_revalidate: Duration,
    /// Season id for stat reads (NHL_SEASON)
    pub season: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            nhl_api_url: std::env::var("NHL_API_URL")
                .unwrap_or_else(|_| NHL_WEB_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            snapshot_revalidate: Duration::from_secs(
                std::env::var("SNAPSHOT_REVALIDATE_SECS")
                    .unwrap_or_else(|_| SNAPSHOT_REVALIDATE_SECS.to_string())
                    .parse::<u64>()
                    .map_err(|_| {
                        AppError::Config(
                            "SNAPSHOT_REVALIDATE_SECS must be a whole number of seconds".to_string(),
                        )
                    })?,
            ),
            season: std::env::var("NHL_SEASON").unwrap_or_else(|_| CURRENT_SEASON.to_string()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Terminal client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let poll_ms = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_MS.to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("POLL_INTERVAL_MS must be milliseconds".to_string()))?;
        if poll_ms == 0 {
            return Err(AppError::Config("POLL_INTERVAL_MS must be positive".to_string()));
        }
        Ok(Self {
            api_url: std::env::var("API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

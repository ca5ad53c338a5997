use crate::common::util::{parse_bool, parse_seconds_or_duration};
use crate::{BotError, Result};
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const ENV_BASE_URL: &str = "MASTODON_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECONDS";
pub const ENV_MIN_BOOST_INTERVAL: &str = "MIN_BOOST_INTERVAL_SECONDS";
pub const ENV_STATE_FILE: &str = "STATE_FILE";
pub const ENV_STARTUP_SKIP_EXISTING: &str = "STARTUP_SKIP_EXISTING";
pub const ENV_LOG_FILE: &str = "LOG_FILE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECONDS";
pub const ENV_API_RETRY: &str = "API_RETRY_SECONDS";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub access_token: AccessToken,
    pub poll_interval: Duration,
    pub min_boost_interval: Duration,
    pub state_file: PathBuf,
    pub startup_skip_existing: bool,
    pub log_file: Option<PathBuf>,
    pub log_level: LevelFilter,
    pub request_timeout: Duration,
    pub api_retry_window: Duration,
}

/// Bearer token, kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Config> {
        // A missing .env file is the normal case in deployments.
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get(ENV_BASE_URL)
            .ok_or_else(|| BotError::MissingConfig(ENV_BASE_URL.to_string()))?;
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| BotError::InvalidConfig(ENV_BASE_URL.to_string(), e.to_string()))?;

        let access_token = get(ENV_ACCESS_TOKEN)
            .map(|t| AccessToken::new(t.trim()))
            .ok_or_else(|| BotError::MissingConfig(ENV_ACCESS_TOKEN.to_string()))?;

        let duration = |key: &str, default_secs: u64| -> Result<Duration> {
            match get(key) {
                Some(v) => parse_seconds_or_duration(&v)
                    .map_err(|e| BotError::InvalidConfig(key.to_string(), e.to_string())),
                None => Ok(Duration::from_secs(default_secs)),
            }
        };

        let poll_interval = duration(ENV_POLL_INTERVAL, 30)?;
        if poll_interval.is_zero() {
            return BotError::InvalidConfig(
                ENV_POLL_INTERVAL.to_string(),
                "must be greater than zero".to_string(),
            )
            .into();
        }

        // LOG_FILE set to an empty string disables the activity log.
        let log_file = match lookup(ENV_LOG_FILE) {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => Some(PathBuf::from("bot.log")),
        };

        let log_level = match get(ENV_LOG_LEVEL) {
            Some(v) => parse_log_level(&v)?,
            None => LevelFilter::Info,
        };

        Ok(Config {
            base_url,
            access_token,
            poll_interval,
            min_boost_interval: duration(ENV_MIN_BOOST_INTERVAL, 3600)?,
            state_file: get(ENV_STATE_FILE)
                .map(|v| PathBuf::from(v.trim()))
                .unwrap_or_else(|| PathBuf::from("state.json")),
            // Set but empty reads as false; only an unset variable takes the default.
            startup_skip_existing: lookup(ENV_STARTUP_SKIP_EXISTING)
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            log_file,
            log_level,
            request_timeout: duration(ENV_REQUEST_TIMEOUT, 10)?,
            api_retry_window: duration(ENV_API_RETRY, 10)?,
        })
    }
}

fn parse_log_level(value: &str) -> Result<LevelFilter> {
    let normalized = match value.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    };

    normalized
        .parse::<LevelFilter>()
        .map_err(|_| BotError::InvalidConfig(ENV_LOG_LEVEL.to_string(), value.to_string()))
}

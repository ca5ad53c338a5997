use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Error performing HTTP request: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Error parsing URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Error parsing duration: {0}")]
    DurationParseError(#[from] duration_str::DError),

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidConfig(String, String),

    #[error("State file {0} is unreadable or corrupt: {1}")]
    CorruptState(PathBuf, String),

    #[error("Access token rejected by the instance (status code {0}): {1:?}")]
    Unauthorized(reqwest::StatusCode, Option<String>),

    #[error("Rate limited by the instance: {0:?}")]
    RateLimited(Option<String>),

    #[error("Mastodon API returned an error: status code {0}, error: {1:?}")]
    ApiError(reqwest::StatusCode, Option<String>),

    #[error("Other: {0}")]
    Other(String),
}

impl BotError {
    /// Errors that end the process rather than being retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::Unauthorized(..)
                | BotError::CorruptState(..)
                | BotError::IoError(_)
                | BotError::MissingConfig(_)
                | BotError::InvalidConfig(..)
        )
    }

    /// Errors worth trying again later: the request may succeed unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::ReqwestError(e) => !e.is_decode() && !e.is_builder(),
            BotError::RateLimited(_) => true,
            BotError::ApiError(status, _) => status.is_server_error(),
            _ => false,
        }
    }
}

impl<T> From<BotError> for Result<T> {
    fn from(val: BotError) -> Self {
        Err(val)
    }
}

use crate::{BotError, Result};
use duration_str::parse;
use std::time::Duration;

/// Parses either a bare number of seconds (`"30"`) or a duration string (`"2m"`, `"1h30m"`).
pub fn parse_seconds_or_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    match value.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => parse(value).map_err(BotError::from),
    }
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

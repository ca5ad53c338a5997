use crate::{Config, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Target for follow/boost records; these are also appended to the activity log file.
pub const ACTIVITY_TARGET: &str = "mastoboost::activity";

struct BotLogger {
    console: Box<dyn Log>,
    activity: Option<Mutex<File>>,
}

impl BotLogger {
    fn writes_activity(&self, metadata: &Metadata) -> bool {
        self.activity.is_some() && is_activity(metadata)
    }
}

impl Log for BotLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.writes_activity(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.enabled(record.metadata()) {
            self.console.log(record);
        }

        if !is_activity(record.metadata()) {
            return;
        }
        if let Some(file) = &self.activity {
            let line = format_activity_line(OffsetDateTime::now_utc(), record);
            // Logging must never take the bot down.
            let _ = file.lock().write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.activity {
            let _ = file.lock().flush();
        }
    }
}

fn is_activity(metadata: &Metadata) -> bool {
    metadata.target() == ACTIVITY_TARGET && metadata.level() <= Level::Info
}

fn format_activity_line(now: OffsetDateTime, record: &Record) -> String {
    let timestamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{} {} {}\n", timestamp, record.level(), record.args())
}

fn open_activity_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Console logging at `LOG_LEVEL` (`RUST_LOG` directives override it), plus the
/// activity log file when `LOG_FILE` is set.
pub fn init(config: &Config) -> Result<()> {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_module("mastoboost", config.log_level);
    if let Ok(directives) = std::env::var("RUST_LOG") {
        builder.parse_filters(&directives);
    }
    let console = builder.build();
    let console_filter = console.filter();

    let activity = match &config.log_file {
        Some(path) => Some(Mutex::new(open_activity_log(path)?)),
        None => None,
    };

    let max_level = if activity.is_some() {
        console_filter.max(LevelFilter::Info)
    } else {
        console_filter
    };

    let logger = BotLogger {
        console: Box::new(console),
        activity,
    };

    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| crate::BotError::Other(format!("logger already initialised: {}", e)))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Console-only logging for failures that happen before the config is usable.
pub fn init_fallback() {
    let _ = pretty_env_logger::formatted_timed_builder()
        .filter_module("mastoboost", LevelFilter::Info)
        .try_init();
}

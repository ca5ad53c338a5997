// pub modules
pub mod common;
pub mod logging;
pub mod mastodon;
pub mod model;
pub mod poller;
pub mod state;

// re-exported types
pub mod config;
pub use config::Config;

mod error;
pub use error::*;

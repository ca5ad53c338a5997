mod notification;

pub use notification::{
    Account, Notification, NotificationId, NotificationKind, Status, Visibility,
};

use serde::{Deserialize, Serialize};

/// Body returned by Mastodon alongside non-2xx responses.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: Option<String>,
}

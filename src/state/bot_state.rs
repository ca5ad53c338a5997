use super::timestamp_map;
use crate::model::NotificationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;

/// Persisted bot progress.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotState {
    #[serde(default)]
    pub last_seen_notification_id: Option<NotificationId>,
    #[serde(default, with = "timestamp_map")]
    pub last_boost_time_by_user: BTreeMap<String, OffsetDateTime>,
    #[serde(default, with = "timestamp_map")]
    pub boosted_status_ids: BTreeMap<String, OffsetDateTime>,
}

impl BotState {
    /// Moves the seen-marker to `id` if it is newer. Returns whether it moved.
    pub fn advance_marker(&mut self, id: &NotificationId) -> bool {
        match &self.last_seen_notification_id {
            Some(current) if current >= id => false,
            _ => {
                self.last_seen_notification_id = Some(id.clone());
                true
            }
        }
    }

    pub fn is_seen(&self, id: &NotificationId) -> bool {
        matches!(&self.last_seen_notification_id, Some(current) if id <= current)
    }

    /// Time since `acct` last triggered a boost, or `None` if it never did.
    /// A boost recorded in the future counts as zero elapsed.
    pub fn since_last_boost(&self, acct: &str, now: OffsetDateTime) -> Option<Duration> {
        self.last_boost_time_by_user
            .get(acct)
            .map(|ts| Duration::try_from(now - *ts).unwrap_or(Duration::ZERO))
    }

    pub fn boost_allowed(&self, acct: &str, now: OffsetDateTime, min_interval: Duration) -> bool {
        match self.since_last_boost(acct, now) {
            Some(elapsed) => elapsed >= min_interval,
            None => true,
        }
    }

    pub fn already_boosted(&self, status_id: &str) -> bool {
        self.boosted_status_ids.contains_key(status_id)
    }

    pub fn record_boost(&mut self, acct: &str, status_id: &str, now: OffsetDateTime) {
        self.last_boost_time_by_user.insert(acct.to_string(), now);
        self.boosted_status_ids.insert(status_id.to_string(), now);
    }

    /// Drops boosted-status entries older than `retention`. The per-user map is left alone.
    pub fn prune_boosted_statuses(&mut self, now: OffsetDateTime, retention: Duration) {
        let cutoff = now - retention;
        self.boosted_status_ids.retain(|_, ts| *ts >= cutoff);
    }
}

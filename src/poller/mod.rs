mod clock;

pub use clock::{Clock, SystemClock};

use std::future::Future;
use std::time::Duration;

use crate::{
    logging::ACTIVITY_TARGET,
    mastodon::MastodonApi,
    model::{Account, Notification, NotificationKind},
    state::{BotState, StateStore},
    Config, Result,
};
use log::{debug, error, info, warn};
use tokio::time::sleep;

/// How long a boosted status id is remembered for duplicate detection.
pub const STATUS_RETENTION: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone, Debug)]
pub struct PollerOptions {
    pub poll_interval: Duration,
    pub min_boost_interval: Duration,
    pub startup_skip_existing: bool,
    pub status_retention: Duration,
}

impl From<&Config> for PollerOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            min_boost_interval: config.min_boost_interval,
            startup_skip_existing: config.startup_skip_existing,
            status_retention: STATUS_RETENTION,
        }
    }
}

/// What a single tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub followed: usize,
    pub boosted: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub rejected: usize,
    /// A transient failure left notifications for the next tick.
    pub deferred: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reaction {
    Followed,
    Boosted,
    Skipped,
    Ignored,
}

impl TickReport {
    fn record(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Followed => self.followed += 1,
            Reaction::Boosted => self.boosted += 1,
            Reaction::Skipped => self.skipped += 1,
            Reaction::Ignored => self.ignored += 1,
        }
    }
}

pub struct Poller<A, C = SystemClock>
where
    A: MastodonApi,
    C: Clock,
{
    api: A,
    clock: C,
    store: StateStore,
    state: BotState,
    options: PollerOptions,
    bot: Account,
    startup_skip_pending: bool,
}

impl<A, C> Poller<A, C>
where
    A: MastodonApi,
    C: Clock,
{
    /// Loads persisted state; a corrupt state file is an error rather than a reset.
    pub async fn new(
        api: A,
        clock: C,
        store: StateStore,
        bot: Account,
        options: PollerOptions,
    ) -> Result<Self> {
        let state = store.load().await?;
        match &state.last_seen_notification_id {
            Some(id) => info!("Resuming after notification {}", id),
            None => info!("No notifications seen yet"),
        }

        let startup_skip_pending =
            options.startup_skip_existing && state.last_seen_notification_id.is_none();

        Ok(Self {
            api,
            clock,
            store,
            state,
            options,
            bot,
            startup_skip_pending,
        })
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// Ticks until `shutdown` resolves. A tick in progress always completes; only
    /// the sleep between ticks is interrupted.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Polling every {:?} as {}",
            self.options.poll_interval, self.bot.acct
        );

        loop {
            let report = self.tick().await?;
            debug!("Tick complete: {:?}", report);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poller");
                    break;
                }
                _ = sleep(self.options.poll_interval) => {}
            }
        }

        Ok(())
    }

    /// One fetch → react → persist cycle. Only fatal errors are returned.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let before = self.state.clone();
        self.state
            .prune_boosted_statuses(self.clock.now(), self.options.status_retention);

        if self.startup_skip_pending {
            let report = self.skip_existing().await;
            self.persist_if_changed(&before).await?;
            return report;
        }

        let mut report = TickReport::default();
        let marker = self.state.last_seen_notification_id.clone();

        let mut notifications = match self.api.notifications_since(marker.as_ref()).await {
            Ok(notifications) => notifications,
            // Only a retry can help a fetch; anything else (bad scope, wrong instance) never will.
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                warn!("Notification fetch failed: {}", e);
                report.deferred = true;
                self.persist_if_changed(&before).await?;
                return Ok(report);
            }
        };
        notifications.sort_by(|a, b| a.id.cmp(&b.id));
        report.fetched = notifications.len();

        if !notifications.is_empty() {
            info!(
                "Fetched {} notifications since_id={}",
                notifications.len(),
                marker.as_ref().map(|id| id.as_str()).unwrap_or("none")
            );
        }

        for notification in &notifications {
            // Already handled, whatever the server sent back.
            if self.state.is_seen(&notification.id) {
                continue;
            }

            match self.react(notification).await {
                Ok(reaction) => report.record(reaction),
                Err(e) if e.is_fatal() => {
                    if let Err(save_err) = self.persist_if_changed(&before).await {
                        error!("Failed to save state before exiting: {}", save_err);
                    }
                    return Err(e);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Handling notification {} failed, retrying next tick: {}",
                        notification.id, e
                    );
                    report.deferred = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Instance rejected action for notification {}, skipping it: {}",
                        notification.id, e
                    );
                    report.rejected += 1;
                }
            }

            self.state.advance_marker(&notification.id);
        }

        self.persist_if_changed(&before).await?;
        Ok(report)
    }

    async fn skip_existing(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        match self.api.newest_notification().await {
            Ok(Some(newest)) => {
                self.state.advance_marker(&newest.id);
                info!(
                    "Startup skip enabled, setting last_seen_notification_id={}",
                    newest.id
                );
            }
            Ok(None) => info!("Startup skip enabled, no existing notifications"),
            // Only a retry can help a fetch; anything else (bad scope, wrong instance) never will.
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                warn!("Notification fetch failed: {}", e);
                report.deferred = true;
                return Ok(report);
            }
        }

        self.startup_skip_pending = false;
        Ok(report)
    }

    async fn react(&mut self, notification: &Notification) -> Result<Reaction> {
        match notification.kind {
            NotificationKind::Follow => {
                let account = &notification.account;
                if account.id == self.bot.id {
                    return Ok(Reaction::Ignored);
                }

                self.api.follow(&account.id).await?;
                info!(target: ACTIVITY_TARGET, "Followed back {}", account.acct);
                Ok(Reaction::Followed)
            }
            NotificationKind::Mention => self.react_to_mention(notification).await,
            NotificationKind::Other => Ok(Reaction::Ignored),
        }
    }

    async fn react_to_mention(&mut self, notification: &Notification) -> Result<Reaction> {
        let status = match &notification.status {
            Some(status) => status,
            None => return Ok(Reaction::Ignored),
        };
        let acct = status.account.acct.as_str();

        if acct == self.bot.acct {
            return Ok(Reaction::Ignored);
        }

        if !status.visibility.is_boostable() {
            debug!(
                "Not boosting {} from {}: {:?} visibility",
                status.id, acct, status.visibility
            );
            return Ok(Reaction::Ignored);
        }

        if self.state.already_boosted(&status.id) {
            info!("Skipping {}; already boosted", status.id);
            return Ok(Reaction::Skipped);
        }

        let now = self.clock.now();
        if !self
            .state
            .boost_allowed(acct, now, self.options.min_boost_interval)
        {
            let ago = self
                .state
                .since_last_boost(acct, now)
                .unwrap_or_default()
                .as_secs();
            info!("Skipping {}; boosted {} seconds ago", acct, ago);
            return Ok(Reaction::Skipped);
        }

        self.api.reblog(&status.id).await?;
        self.state.record_boost(acct, &status.id, now);
        info!(target: ACTIVITY_TARGET, "Boosted {} from {}", status.link(), acct);
        Ok(Reaction::Boosted)
    }

    async fn persist_if_changed(&self, before: &BotState) -> Result<()> {
        if self.state != *before {
            self.store.save(&self.state).await?;
            debug!("State saved to {}", self.store.path().display());
        }
        Ok(())
    }
}

/// Verifies the access token, waiting out transient failures. An invalid token
/// is returned as a fatal error.
pub async fn authenticate<A: MastodonApi>(api: &A, retry_delay: Duration) -> Result<Account> {
    loop {
        match api.verify_credentials().await {
            Ok(account) => return Ok(account),
            Err(e) if e.is_transient() => {
                warn!(
                    "Credential check failed, retrying in {:?}: {}",
                    retry_delay, e
                );
                sleep(retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationId, Status, Visibility};
    use crate::BotError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempdir::TempDir;
    use time::macros::datetime;
    use time::OffsetDateTime;

    const HOUR: Duration = Duration::from_secs(3600);

    #[derive(Default)]
    struct FakeInner {
        notifications: Vec<Notification>,
        ignore_since: bool,
        follows: Vec<String>,
        reblogs: Vec<String>,
        fetch_failures: VecDeque<BotError>,
        follow_failures: VecDeque<BotError>,
        reblog_failures: VecDeque<BotError>,
        credential_failures: VecDeque<BotError>,
    }

    #[derive(Clone, Default)]
    struct FakeApi {
        inner: Arc<Mutex<FakeInner>>,
    }

    impl FakeApi {
        fn with(notifications: Vec<Notification>) -> Self {
            let api = Self::default();
            api.inner.lock().notifications = notifications;
            api
        }

        fn push(&self, notification: Notification) {
            self.inner.lock().notifications.push(notification);
        }

        fn follows(&self) -> Vec<String> {
            self.inner.lock().follows.clone()
        }

        fn reblogs(&self) -> Vec<String> {
            self.inner.lock().reblogs.clone()
        }
    }

    #[async_trait]
    impl MastodonApi for FakeApi {
        async fn verify_credentials(&self) -> Result<Account> {
            match self.inner.lock().credential_failures.pop_front() {
                Some(e) => Err(e),
                None => Ok(bot()),
            }
        }

        async fn notifications_since(
            &self,
            since: Option<&NotificationId>,
        ) -> Result<Vec<Notification>> {
            let mut inner = self.inner.lock();
            if let Some(e) = inner.fetch_failures.pop_front() {
                return Err(e);
            }

            // Newest first, like the real API.
            let mut out = inner
                .notifications
                .iter()
                .filter(|n| inner.ignore_since || since.map_or(true, |since| n.id > *since))
                .cloned()
                .collect::<Vec<_>>();
            out.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(out)
        }

        async fn newest_notification(&self) -> Result<Option<Notification>> {
            let mut inner = self.inner.lock();
            if let Some(e) = inner.fetch_failures.pop_front() {
                return Err(e);
            }
            Ok(inner.notifications.iter().max_by(|a, b| a.id.cmp(&b.id)).cloned())
        }

        async fn follow(&self, account_id: &str) -> Result<()> {
            let mut inner = self.inner.lock();
            if let Some(e) = inner.follow_failures.pop_front() {
                return Err(e);
            }
            inner.follows.push(account_id.to_string());
            Ok(())
        }

        async fn reblog(&self, status_id: &str) -> Result<()> {
            let mut inner = self.inner.lock();
            if let Some(e) = inner.reblog_failures.pop_front() {
                return Err(e);
            }
            inner.reblogs.push(status_id.to_string());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct ManualClock {
        now: Arc<Mutex<OffsetDateTime>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(datetime!(2024-05-01 12:00 UTC))),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock() += by;
        }

        fn set(&self, at: OffsetDateTime) {
            *self.now.lock() = at;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.now.lock()
        }
    }

    fn bot() -> Account {
        account("boostbot")
    }

    fn account(acct: &str) -> Account {
        Account {
            id: format!("id-{}", acct),
            acct: acct.to_string(),
            username: acct.to_string(),
        }
    }

    fn follow(id: u64, acct: &str) -> Notification {
        Notification {
            id: NotificationId::new(id.to_string()),
            kind: NotificationKind::Follow,
            account: account(acct),
            status: None,
        }
    }

    fn mention(id: u64, acct: &str, status_id: &str) -> Notification {
        mention_with_visibility(id, acct, status_id, Visibility::Public)
    }

    fn mention_with_visibility(
        id: u64,
        acct: &str,
        status_id: &str,
        visibility: Visibility,
    ) -> Notification {
        Notification {
            id: NotificationId::new(id.to_string()),
            kind: NotificationKind::Mention,
            account: account(acct),
            status: Some(Status {
                id: status_id.to_string(),
                account: account(acct),
                visibility,
                url: None,
            }),
        }
    }

    fn options(startup_skip_existing: bool) -> PollerOptions {
        PollerOptions {
            poll_interval: Duration::from_millis(10),
            min_boost_interval: HOUR,
            startup_skip_existing,
            status_retention: STATUS_RETENTION,
        }
    }

    async fn poller(
        api: &FakeApi,
        clock: &ManualClock,
        path: &Path,
        startup_skip_existing: bool,
    ) -> Poller<FakeApi, ManualClock> {
        Poller::new(
            api.clone(),
            clock.clone(),
            StateStore::new(path),
            bot(),
            options(startup_skip_existing),
        )
        .await
        .expect("Poller::new failed")
    }

    fn state_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("state.json")
    }

    async fn saved_marker(path: &Path) -> Option<String> {
        StateStore::new(path)
            .load()
            .await
            .expect("load failed")
            .last_seen_notification_id
            .map(|id| id.to_string())
    }

    #[tokio::test]
    async fn test_follow_then_two_mentions_within_window() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![
            follow(1, "alice"),
            mention(2, "alice", "s2"),
            mention(3, "alice", "s3"),
        ]);
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let report = poller.tick().await?;

        assert_eq!(api.follows(), ["id-alice"]);
        assert_eq!(api.reblogs(), ["s2"]);
        assert_eq!(report.followed, 1);
        assert_eq!(report.boosted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_boosts_spaced_by_min_interval() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![mention(1, "alice", "s1")]);
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        poller.tick().await?;

        clock.advance(HOUR / 2);
        api.push(mention(2, "alice", "s2"));
        api.push(mention(3, "bob", "s3"));
        poller.tick().await?;

        clock.advance(HOUR / 2);
        api.push(mention(4, "alice", "s4"));
        poller.tick().await?;

        assert_eq!(api.reblogs(), ["s1", "s3", "s4"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_handled_once_across_polls() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice"), follow(1, "alice")]);
        api.inner.lock().ignore_since = true;
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        poller.tick().await?;
        poller.tick().await?;
        api.push(follow(2, "bob"));
        poller.tick().await?;

        assert_eq!(api.follows(), ["id-alice", "id-bob"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_does_not_reprocess() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice"), mention(2, "bob", "s2")]);
        api.inner.lock().ignore_since = true;
        let clock = ManualClock::new();

        poller(&api, &clock, &state_path(&tmp), false)
            .await
            .tick()
            .await?;

        clock.advance(2 * HOUR);
        let mut restarted = poller(&api, &clock, &state_path(&tmp), true).await;
        let report = restarted.tick().await?;

        assert_eq!(report.followed + report.boosted, 0);
        assert_eq!(api.follows(), ["id-alice"]);
        assert_eq!(api.reblogs(), ["s2"]);

        api.push(mention(3, "bob", "s3"));
        restarted.tick().await?;
        assert_eq!(api.reblogs(), ["s2", "s3"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_startup_skip_existing() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![
            follow(1, "alice"),
            mention(2, "alice", "s2"),
            follow(3, "bob"),
            mention(4, "carol", "s4"),
            mention(5, "dave", "s5"),
        ]);
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), true).await;

        poller.tick().await?;

        assert!(api.follows().is_empty());
        assert!(api.reblogs().is_empty());
        assert_eq!(
            poller.state().last_seen_notification_id,
            Some(NotificationId::new("5"))
        );
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("5"));

        api.push(follow(6, "erin"));
        poller.tick().await?;
        assert_eq!(api.follows(), ["id-erin"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_startup_skip_with_empty_history() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::default();
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), true).await;

        poller.tick().await?;
        assert_eq!(poller.state().last_seen_notification_id, None);

        api.push(mention(1, "alice", "s1"));
        poller.tick().await?;
        assert_eq!(api.reblogs(), ["s1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_state_file_behaves_as_first_run() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let path = state_path(&tmp);
        let api = FakeApi::with(vec![follow(1, "alice"), mention(2, "bob", "s2")]);
        let clock = ManualClock::new();

        poller(&api, &clock, &path, false).await.tick().await?;
        assert_eq!(api.follows().len(), 1);

        std::fs::remove_file(&path).expect("remove failed");
        api.push(follow(3, "carol"));

        let mut fresh = poller(&api, &clock, &path, true).await;
        assert_eq!(fresh.state(), &BotState::default());
        let report = fresh.tick().await?;

        assert_eq!(report, TickReport::default());
        assert_eq!(api.follows().len(), 1);
        assert_eq!(saved_marker(&path).await.as_deref(), Some("3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_failure_defers_remaining() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![
            follow(1, "alice"),
            mention(2, "alice", "s2"),
            follow(3, "bob"),
        ]);
        api.inner
            .lock()
            .reblog_failures
            .push_back(BotError::ApiError(StatusCode::BAD_GATEWAY, None));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let report = poller.tick().await?;
        assert!(report.deferred);
        assert_eq!(api.follows(), ["id-alice"]);
        assert!(api.reblogs().is_empty());
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("1"));

        let report = poller.tick().await?;
        assert!(!report.deferred);
        assert_eq!(api.follows(), ["id-alice", "id-bob"]);
        assert_eq!(api.reblogs(), ["s2"]);
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_boost_spacing_counts_subseconds() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![mention(1, "alice", "s1")]);
        let clock = ManualClock::new();
        clock.set(datetime!(2024-05-01 12:00:00.900 UTC));
        let mut first = poller(&api, &clock, &state_path(&tmp), false).await;

        first.tick().await?;

        clock.set(datetime!(2024-05-01 13:00:00.100 UTC));
        api.push(mention(2, "alice", "s2"));
        let report = first.tick().await?;

        assert_eq!(report.skipped, 1);
        assert_eq!(api.reblogs(), ["s1"]);
        drop(first);

        // The persisted boost time keeps its sub-second part across a restart.
        let mut restarted = poller(&api, &clock, &state_path(&tmp), false).await;

        clock.set(datetime!(2024-05-01 13:00:00.899 UTC));
        api.push(mention(3, "alice", "s3"));
        restarted.tick().await?;
        assert_eq!(api.reblogs(), ["s1"]);

        clock.set(datetime!(2024-05-01 13:00:00.900 UTC));
        api.push(mention(4, "alice", "s4"));
        restarted.tick().await?;
        assert_eq!(api.reblogs(), ["s1", "s4"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_forbidden_fetch_is_fatal() {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice")]);
        api.inner.lock().fetch_failures.push_back(BotError::ApiError(
            StatusCode::FORBIDDEN,
            Some("This action is outside the authorized scopes".to_string()),
        ));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, BotError::ApiError(StatusCode::FORBIDDEN, _)));
        assert!(api.follows().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_fetch_during_startup_skip_is_fatal() {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice")]);
        api.inner
            .lock()
            .fetch_failures
            .push_back(BotError::ApiError(StatusCode::FORBIDDEN, None));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), true).await;

        assert!(poller.tick().await.is_err());
        assert_eq!(poller.state().last_seen_notification_id, None);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice")]);
        api.inner
            .lock()
            .fetch_failures
            .push_back(BotError::RateLimited(None));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let report = poller.tick().await?;
        assert!(report.deferred);
        assert_eq!(poller.state(), &BotState::default());
        assert!(!state_path(&tmp).exists());

        poller.tick().await?;
        assert_eq!(api.follows(), ["id-alice"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal_and_keeps_progress() {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![mention(1, "alice", "s1"), follow(2, "bob")]);
        api.inner
            .lock()
            .follow_failures
            .push_back(BotError::Unauthorized(StatusCode::UNAUTHORIZED, None));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let err = poller.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(api.reblogs(), ["s1"]);
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_rejected_action_is_skipped() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![mention(1, "alice", "gone"), follow(2, "bob")]);
        api.inner
            .lock()
            .reblog_failures
            .push_back(BotError::ApiError(StatusCode::NOT_FOUND, None));
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let report = poller.tick().await?;
        assert_eq!(report.rejected, 1);
        assert_eq!(report.followed, 1);
        assert_eq!(saved_marker(&state_path(&tmp)).await.as_deref(), Some("2"));

        poller.tick().await?;
        assert!(api.reblogs().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_ignored_mentions() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![
            mention(1, "boostbot", "own"),
            mention_with_visibility(2, "alice", "private", Visibility::Private),
            mention_with_visibility(3, "bob", "direct", Visibility::Direct),
            Notification {
                status: None,
                ..mention(4, "carol", "unused")
            },
        ]);
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        let report = poller.tick().await?;
        assert_eq!(report.ignored, 4);
        assert!(api.reblogs().is_empty());
        assert_eq!(
            poller.state().last_seen_notification_id,
            Some(NotificationId::new("4"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_same_status_boosted_once() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![mention(1, "alice", "s1")]);
        let clock = ManualClock::new();
        let mut poller = poller(&api, &clock, &state_path(&tmp), false).await;

        poller.tick().await?;
        clock.advance(2 * HOUR);
        api.push(mention(2, "alice", "s1"));
        let report = poller.tick().await?;

        assert_eq!(report.skipped, 1);
        assert_eq!(api.reblogs(), ["s1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() -> Result<()> {
        let tmp = TempDir::new("poller").expect("tempdir failed");
        let api = FakeApi::with(vec![follow(1, "alice")]);
        let clock = ManualClock::new();
        let poller = poller(&api, &clock, &state_path(&tmp), false).await;

        poller.run(sleep(Duration::from_millis(50))).await?;

        assert_eq!(api.follows(), ["id-alice"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_retries_transient() -> Result<()> {
        let api = FakeApi::default();
        api.inner
            .lock()
            .credential_failures
            .push_back(BotError::ApiError(StatusCode::SERVICE_UNAVAILABLE, None));

        let account = authenticate(&api, Duration::from_millis(1)).await?;
        assert_eq!(account, bot());

        api.inner
            .lock()
            .credential_failures
            .push_back(BotError::Unauthorized(StatusCode::UNAUTHORIZED, None));
        assert!(authenticate(&api, Duration::from_millis(1))
            .await
            .unwrap_err()
            .is_fatal());
        Ok(())
    }
}

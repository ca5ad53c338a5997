mod http_client;

pub use http_client::Page;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::{
    config::AccessToken,
    model::{Account, Notification, NotificationId},
    BotError, Config, Result,
};
use async_trait::async_trait;
use backoff::{Error, ExponentialBackoffBuilder};
use http_client::HttpClient;
use log::{debug, warn};
use url::Url;

/// Largest page Mastodon serves for notifications.
pub const PAGE_LIMIT: usize = 40;
/// Upper bound on pages walked in a single fetch.
pub const MAX_PAGES: usize = 20;

/// The remote operations the poller depends on.
#[async_trait]
pub trait MastodonApi: Send + Sync {
    async fn verify_credentials(&self) -> Result<Account>;

    /// Follow and mention notifications newer than `since`, oldest first.
    /// With no marker, the most recent history is returned.
    async fn notifications_since(&self, since: Option<&NotificationId>)
        -> Result<Vec<Notification>>;

    async fn newest_notification(&self) -> Result<Option<Notification>>;

    async fn follow(&self, account_id: &str) -> Result<()>;

    async fn reblog(&self, status_id: &str) -> Result<()>;
}

pub struct MastodonClient {
    client: HttpClient,
    retry_window: Duration,
}

impl MastodonClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_options(
            config.base_url.clone(),
            config.access_token.clone(),
            config.request_timeout,
            config.api_retry_window,
        )
    }

    pub fn with_options(
        base_url: Url,
        token: AccessToken,
        request_timeout: Duration,
        retry_window: Duration,
    ) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(request_timeout)
            .user_agent(concat!("mastoboost/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client: HttpClient::new_with_client(base_url, token, client),
            retry_window,
        })
    }

    /// Runs `op`, retrying transient failures with exponential backoff until the
    /// retry window is used up.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff_config = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(self.retry_window))
            .build();

        backoff::future::retry_notify(
            backoff_config,
            || {
                let fut = op();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_transient() {
                            Error::transient(e)
                        } else {
                            Error::permanent(e)
                        }
                    })
                }
            },
            |e: BotError, wait: Duration| {
                warn!("{} failed, retrying in {:?}: {}", operation, wait, e);
            },
        )
        .await
    }
}

#[async_trait]
impl MastodonApi for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account> {
        self.with_retry("Credential check", || self.client.verify_credentials())
            .await
    }

    async fn notifications_since(
        &self,
        since: Option<&NotificationId>,
    ) -> Result<Vec<Notification>> {
        let mut collected = BTreeMap::new();
        let mut page = match since {
            Some(id) => Page::After(id.clone()),
            None => Page::Latest,
        };

        for _ in 0..MAX_PAGES {
            let batch = self
                .with_retry("Notification fetch", || {
                    self.client.notifications(&page, PAGE_LIMIT)
                })
                .await?;
            debug!("Fetched page {:?} with {} notifications", page, batch.len());

            let full = batch.len() >= PAGE_LIMIT;
            let newest = batch.iter().map(|n| n.id.clone()).max();
            let oldest = batch.iter().map(|n| n.id.clone()).min();
            collected.extend(batch.into_iter().map(|n| (n.id.clone(), n)));

            if !full {
                break;
            }

            page = match (&page, newest, oldest) {
                (Page::After(_), Some(newest), _) => Page::After(newest),
                (_, _, Some(oldest)) => Page::Before(oldest),
                _ => break,
            };
        }

        Ok(collected.into_values().collect())
    }

    async fn newest_notification(&self) -> Result<Option<Notification>> {
        let batch = self
            .with_retry("Notification fetch", || {
                self.client.notifications(&Page::Latest, 1)
            })
            .await?;

        Ok(batch.into_iter().max_by(|a, b| a.id.cmp(&b.id)))
    }

    async fn follow(&self, account_id: &str) -> Result<()> {
        self.with_retry("Follow", || self.client.follow(account_id))
            .await
    }

    async fn reblog(&self, status_id: &str) -> Result<()> {
        self.with_retry("Boost", || self.client.reblog(status_id))
            .await
    }
}

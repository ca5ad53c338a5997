use crate::{
    config::AccessToken,
    model::{Account, ErrorResponse, Notification, NotificationId},
    BotError, Result,
};
use reqwest::{Response, StatusCode};
use url::Url;

/// Which slice of the notification list to request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Page {
    Latest,
    /// Notifications immediately newer than the given id.
    After(NotificationId),
    /// Notifications older than the given id.
    Before(NotificationId),
}

/// Single-attempt calls against the Mastodon REST API.
#[derive(Clone, Debug)]
pub struct HttpClient {
    base_url: Url,
    token: AccessToken,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new_with_client(mut base_url: Url, token: AccessToken, client: reqwest::Client) -> Self {
        base_url.set_path("/");

        Self {
            base_url,
            token,
            client,
        }
    }

    pub async fn verify_credentials(&self) -> Result<Account> {
        let url = self.base_url.join("api/v1/accounts/verify_credentials")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose())
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    pub async fn notifications(&self, page: &Page, limit: usize) -> Result<Vec<Notification>> {
        let url = self.base_url.join("api/v1/notifications")?;

        let mut query = vec![
            ("types[]", "follow".to_string()),
            ("types[]", "mention".to_string()),
            ("limit", limit.to_string()),
        ];
        match page {
            Page::Latest => {}
            Page::After(id) => query.push(("min_id", id.to_string())),
            Page::Before(id) => query.push(("max_id", id.to_string())),
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose())
            .query(&query)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    pub async fn follow(&self, account_id: &str) -> Result<()> {
        let url = self
            .base_url
            .join(&format!("api/v1/accounts/{}/follow", account_id))?;
        self.post(url).await
    }

    pub async fn reblog(&self, status_id: &str) -> Result<()> {
        let url = self
            .base_url
            .join(&format!("api/v1/statuses/{}/reblog", status_id))?;
        self.post(url).await
    }

    async fn post(&self, url: Url) -> Result<()> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose())
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status_code = response.status();
    if status_code.is_success() {
        return Ok(response);
    }

    let error = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.error);

    match status_code {
        StatusCode::UNAUTHORIZED => Err(BotError::Unauthorized(status_code, error)),
        StatusCode::TOO_MANY_REQUESTS => Err(BotError::RateLimited(error)),
        _ => Err(BotError::ApiError(status_code, error)),
    }
}

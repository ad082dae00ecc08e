use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Credentials, RawPost};
use crate::twitter::model::ApiTweet;
use crate::twitter::oauth::OAuthParams;

pub mod model;
pub mod oauth;

const HOME_TIMELINE_PATH: &str = "1.1/statuses/home_timeline.json";

/// Largest page the home timeline endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("rate limited by the timeline API")]
    RateLimited,
    #[error("timeline API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timeline request timed out")]
    Timeout,
    #[error("failed to reach the timeline API: {0}")]
    Transport(String),
    #[error("invalid timeline payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TimelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TimelineError::Timeout
        } else if err.is_decode() {
            TimelineError::Decode(err.to_string())
        } else {
            TimelineError::Transport(err.to_string())
        }
    }
}

/// Remote home-timeline service, one call per chat and cycle.
#[async_trait]
pub trait TimelineService: Send + Sync {
    async fn home_timeline(
        &self,
        credentials: &Credentials,
        since_id: Option<i64>,
        count: Option<u32>,
    ) -> Result<Vec<RawPost>, TimelineError>;
}

#[derive(Clone)]
pub struct TwitterClient {
    http: Client,
    base_url: Url,
    consumer_key: String,
    consumer_secret: String,
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwitterClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.twitter.api_base).context("invalid twitter.api_base")?;
        Self::with_base_url(
            cfg.twitter.consumer_key.clone(),
            cfg.twitter.consumer_secret.clone(),
            base_url,
            Duration::from_secs(cfg.twitter.timeout_secs),
        )
    }

    pub fn with_base_url(
        consumer_key: String,
        consumer_secret: String,
        base_url: Url,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tw-forwarder/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            consumer_key,
            consumer_secret,
        })
    }

    /// Signed GET for the home timeline. A missing `count` asks for a full page.
    pub fn build_home_timeline_request(
        &self,
        credentials: &Credentials,
        since_id: Option<i64>,
        count: Option<u32>,
    ) -> Result<reqwest::Request, TimelineError> {
        let endpoint = self
            .base_url
            .join(HOME_TIMELINE_PATH)
            .map_err(|e| TimelineError::Transport(format!("invalid base URL: {}", e)))?;

        let mut query: Vec<(String, String)> = vec![
            ("tweet_mode".into(), "extended".into()),
            (
                "count".into(),
                count.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE).to_string(),
            ),
        ];
        if let Some(since_id) = since_id {
            query.push(("since_id".into(), since_id.to_string()));
        }

        let signing = OAuthParams::now(
            &self.consumer_key,
            &self.consumer_secret,
            &credentials.token,
            &credentials.secret,
        );
        let authorization = oauth::authorization_header("GET", endpoint.as_str(), &query, &signing);

        Ok(self
            .http
            .get(endpoint)
            .query(&query)
            .header("Authorization", authorization)
            .build()?)
    }
}

#[async_trait]
impl TimelineService for TwitterClient {
    async fn home_timeline(
        &self,
        credentials: &Credentials,
        since_id: Option<i64>,
        count: Option<u32>,
    ) -> Result<Vec<RawPost>, TimelineError> {
        let request = self.build_home_timeline_request(credentials, since_id, count)?;
        debug!(url = %request.url(), "requesting home timeline");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("rate limited by the timeline API");
            return Err(TimelineError::RateLimited);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TimelineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.text().await?;
        let tweets: Vec<ApiTweet> =
            serde_json::from_str(&body).map_err(|e| TimelineError::Decode(e.to_string()))?;
        Ok(tweets.into_iter().map(RawPost::from).collect())
    }
}

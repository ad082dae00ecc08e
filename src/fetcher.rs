use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{Chat, RawPost};
use crate::twitter::{TimelineError, TimelineService};

/// Tweets requested for a chat that has never been fetched.
pub const INITIAL_SAMPLE_SIZE: u32 = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Shared credential budget exhausted; stop the whole pass.
    #[error("timeline API rate limit reached")]
    RateLimited,
    #[error("chat has no timeline credentials")]
    Unauthorized,
    #[error(transparent)]
    Chat(TimelineError),
}

impl From<TimelineError> for FetchError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::RateLimited => FetchError::RateLimited,
            other => FetchError::Chat(other),
        }
    }
}

pub struct TimelineFetcher {
    timeline: Arc<dyn TimelineService>,
    initial_sample_size: u32,
}

impl TimelineFetcher {
    pub fn new(timeline: Arc<dyn TimelineService>) -> Self {
        Self::with_sample_size(timeline, INITIAL_SAMPLE_SIZE)
    }

    pub fn with_sample_size(timeline: Arc<dyn TimelineService>, initial_sample_size: u32) -> Self {
        Self {
            timeline,
            initial_sample_size,
        }
    }

    /// New tweets for `chat`, oldest first, all strictly newer than its cursor.
    #[instrument(skip_all, fields(chat_id = chat.chat_id))]
    pub async fn fetch(&self, chat: &Chat) -> Result<Vec<RawPost>, FetchError> {
        let credentials = chat.credentials().ok_or(FetchError::Unauthorized)?;

        let mut posts = if chat.last_tweet_id == 0 {
            debug!(count = self.initial_sample_size, "fetching latest tweets");
            self.timeline
                .home_timeline(&credentials, None, Some(self.initial_sample_size))
                .await?
        } else {
            debug!(since_id = chat.last_tweet_id, "fetching new tweets");
            self.timeline
                .home_timeline(&credentials, Some(chat.last_tweet_id), None)
                .await?
        };

        posts.retain(|p| p.id > chat.last_tweet_id);
        posts.sort_by_key(|p| p.id);
        posts.dedup_by_key(|p| p.id);
        Ok(posts)
    }
}

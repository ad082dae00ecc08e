use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Telegram chat registered with the bot, together with its timeline cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: i64,
    pub tg_type: String,
    pub known_at: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub twitter_token: Option<String>,
    pub twitter_secret: Option<String>,
    /// Last forwarded tweet id; 0 means nothing was fetched yet.
    pub last_tweet_id: i64,
    pub timezone_name: Option<String>,
    pub delete_soon: bool,
}

impl Chat {
    pub fn new(chat_id: i64, tg_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            tg_type: tg_type.into(),
            known_at: now,
            last_contact: now,
            twitter_token: None,
            twitter_secret: None,
            last_tweet_id: 0,
            timezone_name: None,
            delete_soon: false,
        }
    }

    pub fn is_group(&self) -> bool {
        self.chat_id < 0
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.twitter_token, &self.twitter_secret) {
            (Some(token), Some(secret)) => Some(Credentials {
                token: token.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.credentials().is_some()
    }

    /// Move the cursor forward; older ids are ignored.
    pub fn advance_cursor(&mut self, tweet_id: i64) {
        if tweet_id > self.last_tweet_id {
            self.last_tweet_id = tweet_id;
        }
    }
}

/// OAuth access token pair issued to a chat.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A tweet as delivered by the timeline API, reduced to what forwarding needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub user_name: String,
    pub user_screen_name: String,
    pub full_text: String,
    pub urls: Vec<UrlEntity>,
    /// `None` when the tweet carries no extended media block at all.
    pub media: Option<Vec<MediaEntity>>,
    pub kind: PostKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostKind {
    Original,
    Retweet { of: Box<SharedPost> },
    Quote { of: Box<SharedPost> },
}

/// The retweeted or quoted tweet nested inside a [`RawPost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedPost {
    pub user_screen_name: String,
    pub full_text: String,
    pub urls: Vec<UrlEntity>,
    pub media: Option<Vec<MediaEntity>>,
}

/// A shortened link and the character span it occupies in `full_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntity {
    pub url: String,
    pub expanded_url: String,
    pub indices: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntity {
    /// Short link the API appends to the text for this media.
    pub url: String,
    pub media_url_https: String,
    pub indices: (usize, usize),
    pub video_variants: Option<Vec<VideoVariant>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoVariant {
    pub bitrate: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub url: String,
}

/// Transport-agnostic form of one tweet, ready to be rendered into a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUnit {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub user_name: String,
    pub user_screen_name: String,
    pub media: Vec<MediaAttachment>,
    /// Link used for the chat's page preview; the first attachment when media exists.
    pub link_url: Option<String>,
}

impl MessageUnit {
    pub fn preview_url(&self) -> Option<&str> {
        self.media
            .first()
            .map(|m| m.url.as_str())
            .or(self.link_url.as_deref())
    }

    pub fn permalink(&self) -> String {
        format!(
            "https://twitter.com/{}/status/{}",
            self.user_screen_name, self.id
        )
    }
}

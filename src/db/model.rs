//! Row types returned by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};

use crate::model::Chat;

pub(crate) const CHAT_COLUMNS: &str = "chat_id, tg_type, known_at, last_contact, twitter_token, \
     twitter_secret, last_tweet_id, timezone_name, delete_soon";

/// One row of the `chats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    pub chat_id: i64,
    pub tg_type: String,
    pub known_at: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub twitter_token: Option<String>,
    pub twitter_secret: Option<String>,
    pub last_tweet_id: i64,
    pub timezone_name: Option<String>,
    pub delete_soon: bool,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Chat {
            chat_id: row.chat_id,
            tg_type: row.tg_type,
            known_at: row.known_at,
            last_contact: row.last_contact,
            twitter_token: row.twitter_token,
            twitter_secret: row.twitter_secret,
            last_tweet_id: row.last_tweet_id,
            timezone_name: row.timezone_name,
            delete_soon: row.delete_soon,
        }
    }
}

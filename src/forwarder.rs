//! Renders [`MessageUnit`]s as chat messages and classifies delivery failures.
use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use teloxide::utils::html;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::model::{Chat, MediaAttachment, MessageUnit};

/// Machine-checkable reason a messaging call failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// Bot blocked, kicked, or the user account is gone.
    Unauthorized,
    /// Group was upgraded to a supergroup and has a new id.
    ChatMigrated,
    ChatNotFound,
    RateLimited,
    Network,
    Api,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorKind::Unauthorized => "unauthorized",
            DeliveryErrorKind::ChatMigrated => "chat_migrated",
            DeliveryErrorKind::ChatNotFound => "chat_not_found",
            DeliveryErrorKind::RateLimited => "rate_limited",
            DeliveryErrorKind::Network => "network",
            DeliveryErrorKind::Api => "api",
        }
    }
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Remote messaging service that receives rendered tweets.
#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        html_text: &str,
        disable_preview: bool,
    ) -> Result<(), DeliveryError>;

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: &[MediaAttachment],
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The chat can no longer receive messages and should be removed.
    ChatInvalid,
    TransientFailure,
}

/// Single place deciding which delivery failures are fatal for a chat.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    fatal: Vec<DeliveryErrorKind>,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::new(vec![
            DeliveryErrorKind::Unauthorized,
            DeliveryErrorKind::ChatMigrated,
        ])
    }
}

impl DeliveryPolicy {
    pub fn new(fatal: Vec<DeliveryErrorKind>) -> Self {
        Self { fatal }
    }

    pub fn classify(&self, err: &DeliveryError) -> DeliveryOutcome {
        if self.fatal.contains(&err.kind) {
            DeliveryOutcome::ChatInvalid
        } else {
            DeliveryOutcome::TransientFailure
        }
    }
}

/// Invisible character wrapped in the preview link.
const PREVIEW_ANCHOR: char = '\u{ad}';
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

pub struct Forwarder {
    messenger: Arc<dyn MessagingService>,
    policy: DeliveryPolicy,
    show_timestamp: bool,
}

impl Forwarder {
    pub fn new(messenger: Arc<dyn MessagingService>, policy: DeliveryPolicy) -> Self {
        Self {
            messenger,
            policy,
            show_timestamp: false,
        }
    }

    pub fn with_timestamps(mut self, show_timestamp: bool) -> Self {
        self.show_timestamp = show_timestamp;
        self
    }

    /// Send one tweet to `chat`. Never touches storage; the caller acts on the outcome.
    #[instrument(skip_all, fields(chat_id = chat.chat_id, tweet_id = unit.id))]
    pub async fn forward(&self, chat: &Chat, unit: &MessageUnit) -> DeliveryOutcome {
        let text = render(unit, chat, self.show_timestamp);
        let disable_preview = unit.preview_url().is_none();

        debug!("sending tweet");
        if let Err(err) = self
            .messenger
            .send_text(chat.chat_id, &text, disable_preview)
            .await
        {
            return self.failed(err);
        }

        if unit.media.len() > 1 {
            if let Err(err) = self
                .messenger
                .send_media_group(chat.chat_id, &unit.media[1..])
                .await
            {
                return self.failed(err);
            }
        }

        DeliveryOutcome::Delivered
    }

    fn failed(&self, err: DeliveryError) -> DeliveryOutcome {
        let outcome = self.policy.classify(&err);
        match outcome {
            DeliveryOutcome::ChatInvalid => {
                info!(kind = %err.kind, error = %err.message, "chat can no longer receive tweets")
            }
            _ => warn!(kind = %err.kind, error = %err.message, "couldn't send tweet"),
        }
        outcome
    }
}

/// HTML message body for `unit`.
///
/// The first line starts with an empty-looking link to the preview URL so the
/// messenger shows the tweet's image, followed by author and permalink.
pub fn render(unit: &MessageUnit, chat: &Chat, show_timestamp: bool) -> String {
    let preview = unit
        .preview_url()
        .map(|url| format!("<a href=\"{}\">{}</a>", escape_attr(url), PREVIEW_ANCHOR))
        .unwrap_or_default();

    let mut out = format!(
        "{}<b>{}</b> (<a href=\"{}\">@{}</a>):\n{}",
        preview,
        html::escape(&unit.user_name),
        escape_attr(&unit.permalink()),
        html::escape(&unit.user_screen_name),
        html::escape(&unit.text),
    );
    if show_timestamp {
        out.push_str("\n<i>");
        out.push_str(&html::escape(&format_timestamp(unit, chat)));
        out.push_str("</i>");
    }
    out
}

/// Escape a value placed inside a double-quoted attribute.
fn escape_attr(value: &str) -> String {
    html::escape(value).replace('"', "&quot;")
}

/// Tweet time in the chat's timezone; unknown or unset zones render as UTC.
pub fn format_timestamp(unit: &MessageUnit, chat: &Chat) -> String {
    match chat
        .timezone_name
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok())
    {
        Some(tz) => unit
            .created_at
            .with_timezone(&tz)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        None => unit.created_at.format(TIMESTAMP_FORMAT).to_string(),
    }
}

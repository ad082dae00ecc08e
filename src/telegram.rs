use async_trait::async_trait;
use reqwest::Url;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, InputMediaVideo, ParseMode};
use teloxide::{ApiError, RequestError};

use crate::forwarder::{DeliveryError, DeliveryErrorKind, MessagingService};
use crate::model::{MediaAttachment, MediaKind};

/// Albums accept at most this many items.
const MAX_GROUP_SIZE: usize = 10;

/// [`MessagingService`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

pub fn classify_request_error(err: &RequestError) -> DeliveryErrorKind {
    match err {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation
            | ApiError::GroupDeactivated => DeliveryErrorKind::Unauthorized,
            // 403 responses teloxide has no variant for
            ApiError::Unknown(msg) if msg.starts_with("Forbidden:") => {
                DeliveryErrorKind::Unauthorized
            }
            ApiError::ChatNotFound => DeliveryErrorKind::ChatNotFound,
            _ => DeliveryErrorKind::Api,
        },
        RequestError::MigrateToChatId(_) => DeliveryErrorKind::ChatMigrated,
        RequestError::RetryAfter(_) => DeliveryErrorKind::RateLimited,
        RequestError::Network(_) | RequestError::Io(_) => DeliveryErrorKind::Network,
        _ => DeliveryErrorKind::Api,
    }
}

fn delivery_error(err: RequestError) -> DeliveryError {
    DeliveryError::new(classify_request_error(&err), err.to_string())
}

fn input_file(url: &str) -> Result<InputFile, DeliveryError> {
    let url = Url::parse(url).map_err(|e| {
        DeliveryError::new(DeliveryErrorKind::Api, format!("invalid media URL {}: {}", url, e))
    })?;
    Ok(InputFile::url(url))
}

fn input_media(attachment: &MediaAttachment) -> Result<InputMedia, DeliveryError> {
    let file = input_file(&attachment.url)?;
    Ok(match attachment.kind {
        MediaKind::Photo => InputMedia::Photo(InputMediaPhoto::new(file)),
        MediaKind::Video => InputMedia::Video(InputMediaVideo::new(file)),
    })
}

#[async_trait]
impl MessagingService for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        html_text: &str,
        disable_preview: bool,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(chat_id), html_text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(disable_preview)
            .await
            .map_err(delivery_error)?;
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: &[MediaAttachment],
    ) -> Result<(), DeliveryError> {
        let chat = ChatId(chat_id);
        for chunk in media.chunks(MAX_GROUP_SIZE) {
            // An album needs at least two items; a lone leftover goes out on its own.
            if let [single] = chunk {
                let file = input_file(&single.url)?;
                let sent = match single.kind {
                    MediaKind::Photo => self.bot.send_photo(chat, file).await.map(|_| ()),
                    MediaKind::Video => self.bot.send_video(chat, file).await.map(|_| ()),
                };
                sent.map_err(delivery_error)?;
                continue;
            }
            let items = chunk
                .iter()
                .map(input_media)
                .collect::<Result<Vec<_>, _>>()?;
            self.bot
                .send_media_group(chat, items)
                .await
                .map_err(delivery_error)?;
        }
        Ok(())
    }
}

use crate::db;
use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, instrument};

const TIMEZONE_LIST_URL: &str = "https://en.wikipedia.org/wiki/List_of_tz_database_time_zones";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ping,
    Wipe,
    Source,
    SetTimezone(Option<String>),
    Unknown(String),
}

/// Parse `/name[@bot] args...`; plain text is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('/')?;
    let mut parts = body.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    let cmd = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "ping" => Command::Ping,
        "wipe" => Command::Wipe,
        "source" => Command::Source,
        "set_timezone" => Command::SetTimezone(parts.next().map(str::to_string)),
        _ => Command::Unknown(name),
    };
    Some(cmd)
}

fn chat_type(chat: &teloxide::types::Chat) -> &'static str {
    if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else {
        "channel"
    }
}

#[instrument(skip_all)]
pub async fn handle_update(bot: &Bot, pool: &db::Pool, msg: &Message) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;
    db::get_or_create_chat(pool, chat_id, chat_type(&msg.chat)).await?;

    let reply = match parse_command(text) {
        Some(cmd) => execute(pool, chat_id, cmd).await?,
        None => "Hey! Use commands to talk with me, please! See /help".to_string(),
    };
    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await?;
    Ok(())
}

/// Apply `cmd` for `chat_id` and return the HTML reply.
pub async fn execute(pool: &db::Pool, chat_id: i64, cmd: Command) -> Result<String> {
    let reply = match cmd {
        Command::Start => "Hello! This bot forwards your Twitter home timeline here. \
                           Check out /help for more info."
            .to_string(),
        Command::Help => help_text(),
        Command::Ping => "Pong!".to_string(),
        Command::Wipe => {
            db::delete_chat(pool, chat_id).await?;
            info!(chat_id, "chat wiped on request");
            "Okay, I'm forgetting about this chat. Come back to me anytime you want. Goodbye!"
                .to_string()
        }
        Command::Source => format!(
            "This is {} {}, free software built on teloxide.",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
        Command::SetTimezone(None) => format!(
            "No timezone specified. Find yours <a href=\"{}\">here</a>!",
            TIMEZONE_LIST_URL
        ),
        Command::SetTimezone(Some(name)) => match name.parse::<Tz>() {
            Ok(tz) => {
                db::set_timezone(pool, chat_id, Some(tz.name())).await?;
                let now = Utc::now().with_timezone(&tz);
                format!("Timezone is set to {}", now.format("%Z %z"))
            }
            Err(_) => format!(
                "Unknown timezone. Find yours <a href=\"{}\">here</a>!",
                TIMEZONE_LIST_URL
            ),
        },
        Command::Unknown(_) => "Unknown command. See /help".to_string(),
    };
    Ok(reply)
}

fn help_text() -> String {
    format!(
        "Hello! This bot forwards you updates from your Twitter home timeline!\n\
         Here's the commands:\n\
         - /wipe - remove all the data about this chat\n\
         - /set_timezone - set your <a href=\"{}\">timezone name</a> (for example Asia/Tokyo)\n\
         - /source - info about source code\n\
         - /ping - check the bot is alive\n\
         - /help - view help text",
        TIMEZONE_LIST_URL
    )
}

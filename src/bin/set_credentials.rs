use anyhow::{bail, Result};
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use tw_forwarder::config;
use tw_forwarder::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Install Twitter access tokens for a chat so its home timeline gets forwarded"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Telegram chat id (negative for groups)
    #[arg(long, allow_hyphen_values = true)]
    chat_id: i64,

    /// OAuth access token issued to the account
    #[arg(long)]
    token: String,

    /// OAuth access token secret
    #[arg(long)]
    secret: String,

    /// Chat type recorded when the chat is new
    #[arg(long, default_value = "private")]
    tg_type: String,

    /// IANA timezone used for timestamps, e.g. Asia/Tokyo
    #[arg(long)]
    timezone: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.token.trim().is_empty() || args.secret.trim().is_empty() {
        bail!("token and secret must be non-empty");
    }
    let timezone = match args.timezone.as_deref() {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => Some(tz.name()),
            Err(_) => bail!("unknown timezone {}", name),
        },
        None => None,
    };

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let chat = db::get_or_create_chat(&pool, args.chat_id, &args.tg_type).await?;
    db::set_credentials(&pool, chat.chat_id, args.token.trim(), args.secret.trim()).await?;
    if timezone.is_some() {
        db::set_timezone(&pool, chat.chat_id, timezone).await?;
    }

    info!(
        chat_id = chat.chat_id,
        cursor = chat.last_tweet_id,
        timezone = timezone.unwrap_or("-"),
        "credentials stored"
    );
    Ok(())
}

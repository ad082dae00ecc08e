use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use tw_forwarder::config;
use tw_forwarder::db::{self, SqliteStore};
use tw_forwarder::fetcher::TimelineFetcher;
use tw_forwarder::forwarder::{DeliveryPolicy, Forwarder};
use tw_forwarder::handlers;
use tw_forwarder::job::ForwardJob;
use tw_forwarder::telegram::TelegramMessenger;
use tw_forwarder::twitter::TwitterClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let timeline = Arc::new(TwitterClient::from_config(&cfg)?);
    let fetcher = TimelineFetcher::with_sample_size(timeline, cfg.twitter.initial_sample_size);
    let forwarder = Forwarder::new(
        Arc::new(TelegramMessenger::new(bot.clone())),
        DeliveryPolicy::new(cfg.telegram.fatal_errors.clone()),
    )
    .with_timestamps(cfg.telegram.show_timestamp);
    let job = Arc::new(ForwardJob::new(store, fetcher, forwarder));

    // Spawn the forwarding scheduler; the first cycle starts right away.
    let period = Duration::from_secs(cfg.app.poll_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            job.run_cycle().await;
        }
    });

    info!(interval_secs = cfg.app.poll_interval_secs, "starting telegram bot");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let pool = pool.clone();
        async move {
            if let Err(err) = handlers::handle_update(&bot, &pool, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}

use super::model::{ChatRow, CHAT_COLUMNS};
use crate::model::Chat;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ask SQLite to
/// create the file and ensure the parent directory exists. Leaves in-memory
/// URLs untouched. Returns possibly-updated URL.
pub(crate) fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded_path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Register a chat on first contact; later contacts refresh `last_contact`
/// and clear a pending deletion, since the chat is evidently reachable again.
#[instrument(skip_all)]
pub async fn get_or_create_chat(pool: &Pool, chat_id: i64, tg_type: &str) -> Result<Chat> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO chats (chat_id, tg_type, known_at, last_contact) VALUES (?, ?, ?, ?) \
         ON CONFLICT(chat_id) DO UPDATE SET last_contact = excluded.last_contact, delete_soon = 0",
    )
    .bind(chat_id)
    .bind(tg_type)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_chat(pool, chat_id)
        .await?
        .with_context(|| format!("chat {} vanished after upsert", chat_id))
}

#[instrument(skip_all)]
pub async fn get_chat(pool: &Pool, chat_id: i64) -> Result<Option<Chat>> {
    let sql = format!("SELECT {} FROM chats WHERE chat_id = ?", CHAT_COLUMNS);
    let row = sqlx::query_as::<_, ChatRow>(&sql)
        .bind(chat_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Chat::from))
}

#[instrument(skip_all)]
pub async fn set_timezone(pool: &Pool, chat_id: i64, timezone_name: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE chats SET timezone_name = ? WHERE chat_id = ?")
        .bind(timezone_name)
        .bind(chat_id)
        .execute(pool)
        .await
        .context("failed to persist timezone")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_credentials(pool: &Pool, chat_id: i64, token: &str, secret: &str) -> Result<()> {
    sqlx::query("UPDATE chats SET twitter_token = ?, twitter_secret = ? WHERE chat_id = ?")
        .bind(token)
        .bind(secret)
        .bind(chat_id)
        .execute(pool)
        .await
        .context("failed to persist credentials")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_authorized_chats(pool: &Pool) -> Result<Vec<Chat>> {
    let sql = format!(
        "SELECT {} FROM chats \
         WHERE twitter_token IS NOT NULL AND twitter_secret IS NOT NULL \
         ORDER BY id",
        CHAT_COLUMNS
    );
    let rows = sqlx::query_as::<_, ChatRow>(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Chat::from).collect())
}

#[instrument(skip_all)]
pub async fn list_pending_deletion(pool: &Pool) -> Result<Vec<Chat>> {
    let sql = format!(
        "SELECT {} FROM chats WHERE delete_soon = 1 ORDER BY id",
        CHAT_COLUMNS
    );
    let rows = sqlx::query_as::<_, ChatRow>(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Chat::from).collect())
}

/// Store a chat's cursor and deletion flag after a forwarding pass.
///
/// The cursor only moves forward and the flag, once set, stays set until the
/// chat is purged or talks to the bot again.
#[instrument(skip_all)]
pub async fn save_progress(pool: &Pool, chat: &Chat) -> Result<()> {
    sqlx::query(
        "UPDATE chats SET last_tweet_id = MAX(last_tweet_id, ?), delete_soon = (delete_soon OR ?) \
         WHERE chat_id = ?",
    )
    .bind(chat.last_tweet_id)
    .bind(chat.delete_soon)
    .bind(chat.chat_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save progress for chat {}", chat.chat_id))?;
    Ok(())
}

/// Remove a chat and everything recorded for it.
#[instrument(skip_all)]
pub async fn delete_chat(pool: &Pool, chat_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chats WHERE chat_id = ?")
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

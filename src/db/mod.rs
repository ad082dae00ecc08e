//! Database module: row models, SQL repositories and the SQLite cursor store.
//!
//! - `model`: typed rows returned by repositories.
//! - `repo`: SQL-only functions that map rows into domain chats.
//!
//! External modules import from `tw_forwarder::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::Chat;
use crate::store::CursorStore;

/// [`CursorStore`] over the `chats` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn list_authorized_chats(&self) -> Result<Vec<Chat>> {
        repo::list_authorized_chats(&self.pool).await
    }

    async fn save(&self, chat: &Chat) -> Result<()> {
        repo::save_progress(&self.pool, chat).await
    }

    async fn delete(&self, chat: &Chat) -> Result<()> {
        repo::delete_chat(&self.pool, chat.chat_id).await
    }

    async fn list_pending_deletion(&self) -> Result<Vec<Chat>> {
        repo::list_pending_deletion(&self.pool).await
    }
}

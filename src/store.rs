use anyhow::Result;
use async_trait::async_trait;

use crate::model::Chat;

/// Persistent per-chat cursors and deletion flags.
///
/// Only the forwarding job mutates chats through this trait; a chat is read
/// once and written once per cycle.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Chats holding timeline credentials, in a stable order.
    async fn list_authorized_chats(&self) -> Result<Vec<Chat>>;

    /// Persist cursor and deletion flag. The stored cursor never decreases.
    async fn save(&self, chat: &Chat) -> Result<()>;

    /// Remove the chat and everything attached to it.
    async fn delete(&self, chat: &Chat) -> Result<()>;

    async fn list_pending_deletion(&self) -> Result<Vec<Chat>>;
}

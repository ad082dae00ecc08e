//! One forwarding cycle: fetch → normalize → forward for every authorized
//! chat, then purge chats flagged for deletion.
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::fetcher::{FetchError, TimelineFetcher};
use crate::forwarder::{DeliveryOutcome, Forwarder};
use crate::model::Chat;
use crate::normalize::normalize;
use crate::store::CursorStore;

/// Counters for the end-of-cycle log line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub chats_processed: usize,
    pub chats_failed: usize,
    pub chats_skipped: usize,
    pub tweets_delivered: usize,
    pub tweets_failed: usize,
    pub chats_flagged: usize,
    pub chats_purged: usize,
    pub rate_limited: bool,
}

enum ChatResult {
    Done,
    FetchFailed,
    RateLimited,
}

pub struct ForwardJob {
    store: Arc<dyn CursorStore>,
    fetcher: TimelineFetcher,
    forwarder: Forwarder,
    running: Mutex<()>,
}

impl ForwardJob {
    pub fn new(store: Arc<dyn CursorStore>, fetcher: TimelineFetcher, forwarder: Forwarder) -> Self {
        Self {
            store,
            fetcher,
            forwarder,
            running: Mutex::new(()),
        }
    }

    /// Run one full cycle. Overlapping calls return immediately; failures are
    /// only visible through logs and the store.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("previous forwarding cycle still running; skipping");
            return;
        };

        let mut stats = CycleStats::default();
        self.forward_all(&mut stats).await;
        self.purge_flagged(&mut stats).await;

        info!(
            processed = stats.chats_processed,
            failed = stats.chats_failed,
            skipped = stats.chats_skipped,
            delivered = stats.tweets_delivered,
            undelivered = stats.tweets_failed,
            flagged = stats.chats_flagged,
            purged = stats.chats_purged,
            rate_limited = stats.rate_limited,
            "forwarding cycle finished"
        );
    }

    #[instrument(skip_all)]
    async fn forward_all(&self, stats: &mut CycleStats) {
        let chats = match self.store.list_authorized_chats().await {
            Ok(chats) => chats,
            Err(err) => {
                error!(?err, "failed to list chats");
                return;
            }
        };
        debug!(count = chats.len(), "fetching tweets");

        let total = chats.len();
        for (index, chat) in chats.into_iter().enumerate() {
            match self.process_chat(chat, stats).await {
                ChatResult::Done => stats.chats_processed += 1,
                ChatResult::FetchFailed => stats.chats_failed += 1,
                ChatResult::RateLimited => {
                    stats.rate_limited = true;
                    stats.chats_skipped = total - index;
                    warn!(skipped = stats.chats_skipped, "hit rate limit; stopping this cycle");
                    break;
                }
            }
        }
    }

    #[instrument(skip_all, fields(chat_id = chat.chat_id))]
    async fn process_chat(&self, mut chat: Chat, stats: &mut CycleStats) -> ChatResult {
        let posts = match self.fetcher.fetch(&chat).await {
            Ok(posts) => posts,
            Err(FetchError::RateLimited) => return ChatResult::RateLimited,
            Err(err) => {
                warn!(%err, "failed to fetch tweets; skipping chat");
                return ChatResult::FetchFailed;
            }
        };
        if posts.is_empty() {
            return ChatResult::Done;
        }

        let was_flagged = chat.delete_soon;
        for post in &posts {
            debug!(tweet_id = post.id, author = %post.user_screen_name, "got tweet");
            let unit = normalize(post);
            match self.forwarder.forward(&chat, &unit).await {
                DeliveryOutcome::Delivered => stats.tweets_delivered += 1,
                DeliveryOutcome::ChatInvalid => {
                    stats.tweets_failed += 1;
                    chat.delete_soon = true;
                }
                DeliveryOutcome::TransientFailure => stats.tweets_failed += 1,
            }
            // Advance even on failure so one bad tweet cannot block newer ones.
            chat.advance_cursor(post.id);
        }
        if chat.delete_soon && !was_flagged {
            info!("marking chat for deletion");
            stats.chats_flagged += 1;
        }

        if let Err(err) = self.store.save(&chat).await {
            error!(?err, "failed to save chat progress");
        }
        ChatResult::Done
    }

    #[instrument(skip_all)]
    async fn purge_flagged(&self, stats: &mut CycleStats) {
        let flagged = match self.store.list_pending_deletion().await {
            Ok(chats) => chats,
            Err(err) => {
                error!(?err, "failed to list chats marked for deletion");
                return;
            }
        };
        for chat in flagged {
            match self.store.delete(&chat).await {
                Ok(()) => {
                    info!(chat_id = chat.chat_id, "deleted chat");
                    stats.chats_purged += 1;
                }
                Err(err) => error!(?err, chat_id = chat.chat_id, "failed to delete chat"),
            }
        }
    }
}

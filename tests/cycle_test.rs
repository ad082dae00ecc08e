use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tw_forwarder::db::{self, SqliteStore};
use tw_forwarder::fetcher::TimelineFetcher;
use tw_forwarder::forwarder::{
    DeliveryError, DeliveryErrorKind, DeliveryPolicy, Forwarder, MessagingService,
};
use tw_forwarder::job::ForwardJob;
use tw_forwarder::model::{Chat, Credentials, MediaAttachment, PostKind, RawPost};
use tw_forwarder::store::CursorStore;
use tw_forwarder::twitter::{TimelineError, TimelineService};

async fn setup_pool() -> db::Pool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

fn tweet(id: i64) -> RawPost {
    RawPost {
        id,
        created_at: Utc::now(),
        user_name: "Poster".into(),
        user_screen_name: "poster".into(),
        full_text: format!("tweet number {}", id),
        urls: vec![],
        media: None,
        kind: PostKind::Original,
    }
}

fn tweets(ids: &[i64]) -> Vec<RawPost> {
    ids.iter().copied().map(tweet).collect()
}

fn token_for(chat_id: i64) -> String {
    format!("tok-{}", chat_id)
}

async fn authorized_chat(pool: &db::Pool, chat_id: i64, cursor: i64) {
    let mut chat = db::get_or_create_chat(pool, chat_id, "private").await.unwrap();
    db::set_credentials(pool, chat_id, &token_for(chat_id), "secret")
        .await
        .unwrap();
    chat.last_tweet_id = cursor;
    db::save_progress(pool, &chat).await.unwrap();
}

async fn cursor_of(pool: &db::Pool, chat_id: i64) -> Option<i64> {
    db::get_chat(pool, chat_id)
        .await
        .unwrap()
        .map(|c| c.last_tweet_id)
}

type TimelineCall = (String, Option<i64>, Option<u32>);

/// Timeline responses scripted per access token.
#[derive(Default)]
struct ScriptedTimeline {
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<RawPost>, TimelineError>>>>,
    calls: Mutex<Vec<TimelineCall>>,
    delay: Option<Duration>,
}

impl ScriptedTimeline {
    async fn script(&self, chat_id: i64, response: Result<Vec<RawPost>, TimelineError>) {
        self.responses
            .lock()
            .await
            .entry(token_for(chat_id))
            .or_default()
            .push_back(response);
    }

    async fn calls(&self) -> Vec<TimelineCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl TimelineService for ScriptedTimeline {
    async fn home_timeline(
        &self,
        credentials: &Credentials,
        since_id: Option<i64>,
        count: Option<u32>,
    ) -> Result<Vec<RawPost>, TimelineError> {
        self.calls
            .lock()
            .await
            .push((credentials.token.clone(), since_id, count));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .await
            .get_mut(&credentials.token)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(vec![]))
    }
}

#[derive(Debug, Clone)]
struct SentText {
    chat_id: i64,
    text: String,
}

#[derive(Default)]
struct RecordingMessenger {
    failures: Mutex<VecDeque<Option<DeliveryErrorKind>>>,
    texts: Mutex<Vec<SentText>>,
    groups: Mutex<Vec<(i64, Vec<MediaAttachment>)>>,
}

impl RecordingMessenger {
    fn failing_with(failures: Vec<Option<DeliveryErrorKind>>) -> Self {
        Self {
            failures: Mutex::new(VecDeque::from(failures)),
            ..Default::default()
        }
    }

    async fn texts(&self) -> Vec<SentText> {
        self.texts.lock().await.clone()
    }
}

#[async_trait]
impl MessagingService for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        html_text: &str,
        _disable_preview: bool,
    ) -> Result<(), DeliveryError> {
        self.texts.lock().await.push(SentText {
            chat_id,
            text: html_text.to_string(),
        });
        match self.failures.lock().await.pop_front().flatten() {
            Some(kind) => Err(DeliveryError::new(kind, "scripted failure")),
            None => Ok(()),
        }
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: &[MediaAttachment],
    ) -> Result<(), DeliveryError> {
        self.groups.lock().await.push((chat_id, media.to_vec()));
        Ok(())
    }
}

/// Records what the store held for each chat right before it was deleted.
struct ObservingStore {
    inner: SqliteStore,
    deleted: Mutex<Vec<Chat>>,
}

#[async_trait]
impl CursorStore for ObservingStore {
    async fn list_authorized_chats(&self) -> Result<Vec<Chat>> {
        self.inner.list_authorized_chats().await
    }

    async fn save(&self, chat: &Chat) -> Result<()> {
        self.inner.save(chat).await
    }

    async fn delete(&self, chat: &Chat) -> Result<()> {
        if let Some(stored) = db::get_chat(self.inner.pool(), chat.chat_id).await? {
            self.deleted.lock().await.push(stored);
        }
        self.inner.delete(chat).await
    }

    async fn list_pending_deletion(&self) -> Result<Vec<Chat>> {
        self.inner.list_pending_deletion().await
    }
}

struct Harness {
    pool: db::Pool,
    store: Arc<ObservingStore>,
    timeline: Arc<ScriptedTimeline>,
    messenger: Arc<RecordingMessenger>,
    job: ForwardJob,
}

fn harness(pool: db::Pool, timeline: ScriptedTimeline, messenger: RecordingMessenger) -> Harness {
    let store = Arc::new(ObservingStore {
        inner: SqliteStore::new(pool.clone()),
        deleted: Mutex::new(vec![]),
    });
    let timeline = Arc::new(timeline);
    let messenger = Arc::new(messenger);
    let job = ForwardJob::new(
        store.clone(),
        TimelineFetcher::new(timeline.clone()),
        Forwarder::new(messenger.clone(), DeliveryPolicy::default()),
    );
    Harness {
        pool,
        store,
        timeline,
        messenger,
        job,
    }
}

#[tokio::test]
async fn new_chat_gets_initial_sample_and_cursor_advances() {
    let pool = setup_pool().await;
    authorized_chat(&pool, 1, 0).await;
    let h = harness(pool, ScriptedTimeline::default(), RecordingMessenger::default());
    h.timeline.script(1, Ok(tweets(&[14, 10, 12, 11, 13]))).await;

    h.job.run_cycle().await;

    assert_eq!(h.timeline.calls().await, vec![(token_for(1), None, Some(5))]);
    let texts = h.messenger.texts().await;
    assert_eq!(texts.len(), 5);
    assert!(texts.iter().all(|t| t.chat_id == 1));
    let order: Vec<bool> = [10, 11, 12, 13, 14]
        .iter()
        .zip(&texts)
        .map(|(id, sent)| sent.text.contains(&format!("tweet number {}", id)))
        .collect();
    assert!(order.iter().all(|ok| *ok), "tweets must go out oldest first");

    let chat = db::get_chat(&h.pool, 1).await.unwrap().unwrap();
    assert_eq!(chat.last_tweet_id, 14);
    assert!(!chat.delete_soon);

    // the next cycle only asks for newer tweets
    h.job.run_cycle().await;
    assert_eq!(h.timeline.calls().await[1], (token_for(1), Some(14), None));
}

#[tokio::test]
async fn invalid_chat_still_advances_and_is_purged_after_forwarding() {
    let pool = setup_pool().await;
    authorized_chat(&pool, 1, 0).await;
    let messenger = RecordingMessenger::failing_with(vec![
        None,
        None,
        Some(DeliveryErrorKind::Unauthorized),
        None,
        None,
    ]);
    let h = harness(pool, ScriptedTimeline::default(), messenger);
    h.timeline.script(1, Ok(tweets(&[1, 2, 3, 4, 5]))).await;

    h.job.run_cycle().await;

    assert_eq!(h.messenger.texts().await.len(), 5);
    let deleted = h.store.deleted.lock().await.clone();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].chat_id, 1);
    assert_eq!(deleted[0].last_tweet_id, 5);
    assert!(deleted[0].delete_soon);
    assert_eq!(cursor_of(&h.pool, 1).await, None);
}

#[tokio::test]
async fn transient_delivery_failure_does_not_block_or_flag() {
    let pool = setup_pool().await;
    authorized_chat(&pool, 1, 100).await;
    let messenger = RecordingMessenger::failing_with(vec![
        Some(DeliveryErrorKind::Network),
        Some(DeliveryErrorKind::RateLimited),
    ]);
    let h = harness(pool, ScriptedTimeline::default(), messenger);
    h.timeline.script(1, Ok(tweets(&[103, 101, 102]))).await;

    h.job.run_cycle().await;

    let chat = db::get_chat(&h.pool, 1).await.unwrap().unwrap();
    assert_eq!(chat.last_tweet_id, 103);
    assert!(!chat.delete_soon);
    assert!(h.store.deleted.lock().await.is_empty());
}

#[tokio::test]
async fn rate_limit_stops_remaining_chats_but_cleanup_runs() {
    let pool = setup_pool().await;
    for chat_id in 1..=4 {
        authorized_chat(&pool, chat_id, 50).await;
    }
    // flagged during an earlier cycle
    let mut stale = db::get_chat(&pool, 4).await.unwrap().unwrap();
    stale.delete_soon = true;
    db::save_progress(&pool, &stale).await.unwrap();

    let h = harness(pool, ScriptedTimeline::default(), RecordingMessenger::default());
    h.timeline.script(1, Ok(tweets(&[51, 52]))).await;
    h.timeline.script(2, Err(TimelineError::RateLimited)).await;
    h.timeline.script(3, Ok(tweets(&[60]))).await;

    h.job.run_cycle().await;

    let fetched: Vec<String> = h.timeline.calls().await.into_iter().map(|c| c.0).collect();
    assert_eq!(fetched, vec![token_for(1), token_for(2)]);
    assert_eq!(cursor_of(&h.pool, 1).await, Some(52));
    assert_eq!(cursor_of(&h.pool, 2).await, Some(50));
    assert_eq!(cursor_of(&h.pool, 3).await, Some(50));
    assert_eq!(cursor_of(&h.pool, 4).await, None, "cleanup still purges flagged chats");
    assert_eq!(h.messenger.texts().await.len(), 2);
}

#[tokio::test]
async fn fetch_error_skips_only_that_chat() {
    let pool = setup_pool().await;
    authorized_chat(&pool, 1, 10).await;
    authorized_chat(&pool, 2, 20).await;
    let h = harness(pool, ScriptedTimeline::default(), RecordingMessenger::default());
    h.timeline
        .script(
            1,
            Err(TimelineError::Status {
                status: 401,
                body: "Invalid or expired token".into(),
            }),
        )
        .await;
    h.timeline.script(2, Ok(tweets(&[21]))).await;

    h.job.run_cycle().await;

    assert_eq!(cursor_of(&h.pool, 1).await, Some(10));
    assert_eq!(cursor_of(&h.pool, 2).await, Some(21));
    let chat = db::get_chat(&h.pool, 1).await.unwrap().unwrap();
    assert!(!chat.delete_soon);
}

#[tokio::test]
async fn chats_without_credentials_are_ignored() {
    let pool = setup_pool().await;
    db::get_or_create_chat(&pool, 9, "private").await.unwrap();
    let h = harness(pool, ScriptedTimeline::default(), RecordingMessenger::default());

    h.job.run_cycle().await;

    assert!(h.timeline.calls().await.is_empty());
    assert_eq!(cursor_of(&h.pool, 9).await, Some(0));
}

#[tokio::test]
async fn overlapping_cycles_do_not_interleave() {
    let pool = setup_pool().await;
    authorized_chat(&pool, 1, 0).await;
    let timeline = ScriptedTimeline {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let h = harness(pool, timeline, RecordingMessenger::default());
    h.timeline.script(1, Ok(tweets(&[1]))).await;
    h.timeline.script(1, Ok(tweets(&[2]))).await;

    tokio::join!(h.job.run_cycle(), h.job.run_cycle());

    assert_eq!(h.timeline.calls().await.len(), 1);
    assert_eq!(cursor_of(&h.pool, 1).await, Some(1));
}

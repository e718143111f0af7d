//! Scheduler tests: lock serialization, buffer settlement, background
//! ordering. In-memory SQLite, scripted provider.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use recall_core::config::{FlushConfig, LlmConfig, MemoryConfig, ROOT_PROJECT_ID};
use recall_core::types::{Blob, BlobType, BufferStatus, ChatMessage, MessageRole};
use recall_core::MemoryError;
use recall_coord::{user_lock_key, Cache, LockRegistry, WorkQueues};
use recall_llm::testing::ScriptedProvider;
use recall_llm::LlmGateway;
use recall_pipeline::Consolidator;
use recall_scheduler::FlushScheduler;
use recall_store::blobs::BlobStore;
use recall_store::buffer::BufferStore;
use recall_store::events::EventStore;
use recall_store::profiles::ProfileStore;
use recall_store::projects::ProjectStore;

const USER: &str = "user-1";

struct Harness {
    buffer: Arc<BufferStore>,
    blobs: Arc<BlobStore>,
    profiles: Arc<ProfileStore>,
    events: Arc<EventStore>,
    locks: Arc<LockRegistry>,
    provider: ScriptedProvider,
    scheduler: Arc<FlushScheduler>,
}

fn harness(memory: MemoryConfig, flush: FlushConfig) -> Harness {
    let db = recall_store::open_in_memory().unwrap();
    let cache = Arc::new(Cache::new());
    let buffer = Arc::new(BufferStore::new(db.clone()));
    let blobs = Arc::new(BlobStore::new(db.clone()));
    let profiles = Arc::new(ProfileStore::new(
        db.clone(),
        cache,
        Duration::from_secs(300),
    ));
    let events = Arc::new(EventStore::new(db.clone()));
    let projects = Arc::new(ProjectStore::new(db.clone()));
    projects.ensure_root().unwrap();
    recall_store::users::UserStore::new(db)
        .create(ROOT_PROJECT_ID, Some(USER.to_string()), None)
        .unwrap();

    let provider = ScriptedProvider::new();
    let gateway = Arc::new(LlmGateway::new(
        Arc::new(provider.clone()),
        projects.clone(),
        LlmConfig {
            max_retries: 0,
            timeout_secs: 5,
            ..Default::default()
        },
    ));
    let consolidator = Arc::new(Consolidator::new(
        profiles.clone(),
        events.clone(),
        gateway,
        memory.clone(),
    ));
    let locks = Arc::new(LockRegistry::new());
    let scheduler = Arc::new(FlushScheduler::new(
        buffer.clone(),
        blobs.clone(),
        projects,
        locks.clone(),
        Arc::new(WorkQueues::new()),
        consolidator,
        memory,
        flush,
        CancellationToken::new(),
    ));
    Harness {
        buffer,
        blobs,
        profiles,
        events,
        locks,
        provider,
        scheduler,
    }
}

fn default_harness() -> Harness {
    harness(
        MemoryConfig {
            min_event_summary_tokens: 1,
            ..Default::default()
        },
        FlushConfig {
            lock_block_secs: 1,
            ..Default::default()
        },
    )
}

fn insert_chat(h: &Harness, text: &str) -> (String, String) {
    let blob = Blob::Chat {
        messages: vec![ChatMessage {
            role: MessageRole::User,
            content: text.to_string(),
            alias: None,
            created_at: None,
        }],
    };
    let blob_id = h.blobs.put(ROOT_PROJECT_ID, USER, &blob).unwrap();
    let entry_id = h
        .buffer
        .enqueue(ROOT_PROJECT_ID, USER, BlobType::Chat, &blob_id, 20)
        .unwrap();
    (blob_id, entry_id)
}

#[tokio::test]
async fn sync_flush_commits_and_settles_buffer() {
    let h = default_harness();
    let (blob_id, _) = insert_chat(&h, "Hi, I'm Gus");
    h.provider
        .push("extract_profile", "- basic_info::name::Gus");
    h.provider.push("summary_chats", "User said their name is Gus.");

    let result = h
        .scheduler
        .flush_sync(ROOT_PROJECT_ID, USER, BlobType::Chat)
        .await
        .unwrap()
        .expect("a batch was flushed");
    assert_eq!(result.added.len(), 1);

    // the returned event id is readable
    let event_id = result.event_id.expect("event written");
    assert!(h.events.get(ROOT_PROJECT_ID, USER, &event_id).is_ok());

    // buffer drained, consolidated chat blob tombstoned
    for status in [BufferStatus::Idle, BufferStatus::Processing, BufferStatus::Done] {
        assert_eq!(
            h.buffer
                .count(ROOT_PROJECT_ID, USER, BlobType::Chat, status)
                .unwrap(),
            0
        );
    }
    assert!(h.blobs.get(ROOT_PROJECT_ID, USER, &blob_id).is_err());
}

#[tokio::test]
async fn empty_buffer_flush_is_none() {
    let h = default_harness();
    let result = h
        .scheduler
        .flush_sync(ROOT_PROJECT_ID, USER, BlobType::Chat)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn doc_buffers_cannot_be_flushed() {
    let h = default_harness();
    let err = h
        .scheduler
        .flush_sync(ROOT_PROJECT_ID, USER, BlobType::Doc)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::BadRequest(_)));
}

#[tokio::test]
async fn failed_flush_marks_batch_failed_and_keeps_blob() {
    let h = default_harness();
    let (blob_id, entry_id) = insert_chat(&h, "hello");
    h.provider.push_error("extract_profile");

    let err = h
        .scheduler
        .flush_sync(ROOT_PROJECT_ID, USER, BlobType::Chat)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::ServiceUnavailable(_)));

    let failed = h
        .buffer
        .pending_ids(ROOT_PROJECT_ID, USER, BlobType::Chat, BufferStatus::Failed)
        .unwrap();
    assert_eq!(failed, vec![entry_id]);
    // nothing was committed and the blob is still there for a retry
    assert!(h.blobs.get(ROOT_PROJECT_ID, USER, &blob_id).is_ok());
    assert!(h.profiles.list(ROOT_PROJECT_ID, USER).unwrap().is_empty());
    assert!(h
        .events
        .list(ROOT_PROJECT_ID, USER, 10, None, false)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn held_lock_blocks_sync_flush() {
    let h = default_harness();
    insert_chat(&h, "hello");
    let key = user_lock_key(ROOT_PROJECT_ID, "flush_chat", USER);
    let token = h
        .locks
        .try_acquire(&key, Duration::from_secs(60))
        .unwrap();

    let err = h
        .scheduler
        .flush_sync(ROOT_PROJECT_ID, USER, BlobType::Chat)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Conflict(_)));

    // entries were never claimed
    assert_eq!(
        h.buffer
            .count(ROOT_PROJECT_ID, USER, BlobType::Chat, BufferStatus::Idle)
            .unwrap(),
        1
    );
    h.locks.release(&key, &token);
}

#[tokio::test]
async fn size_trigger_schedules_background_flush() {
    let h = harness(
        MemoryConfig {
            max_buffer_tokens: 30,
            min_event_summary_tokens: 1,
            ..Default::default()
        },
        FlushConfig::default(),
    );
    h.provider
        .push("extract_profile", "- basic_info::name::Gus");
    h.provider.push("summary_chats", "intro");

    insert_chat(&h, "first");
    // under the trigger: nothing scheduled
    h.scheduler
        .on_enqueue(ROOT_PROJECT_ID, USER, BlobType::Chat, false)
        .await
        .unwrap();
    insert_chat(&h, "second");
    // 40 tokens idle now exceeds the 30-token trigger
    h.scheduler
        .on_enqueue(ROOT_PROJECT_ID, USER, BlobType::Chat, false)
        .await
        .unwrap();

    wait_until(|| {
        h.profiles
            .list(ROOT_PROJECT_ID, USER)
            .map(|p| p.len() == 1)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(
        h.events
            .list(ROOT_PROJECT_ID, USER, 10, None, false)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn background_batches_commit_in_selection_order() {
    let h = default_harness();
    // batch 1 and batch 2 extract different topics; the worker drains FIFO
    h.provider
        .push("extract_profile", "- interest::travel::loves China");
    h.provider
        .push("extract_profile", "- work::title::engineer");
    h.provider.push("summary_chats", "s1");
    h.provider.push("summary_chats", "s2");

    let (_, e1) = insert_chat(&h, "I love traveling to China");
    h.scheduler
        .spawn_background(ROOT_PROJECT_ID, USER, BlobType::Chat, &[e1])
        .unwrap();
    let (_, e2) = insert_chat(&h, "I work as an engineer");
    h.scheduler
        .spawn_background(ROOT_PROJECT_ID, USER, BlobType::Chat, &[e2])
        .unwrap();

    wait_until(|| {
        h.events
            .list(ROOT_PROJECT_ID, USER, 10, None, false)
            .map(|e| e.len() == 2)
            .unwrap_or(false)
    })
    .await;

    let events = h.events.list(ROOT_PROJECT_ID, USER, 10, None, false).unwrap();
    // newest first: the travel batch committed before the work batch
    assert_eq!(
        events[1].data.profile_delta[0].attributes.topic,
        "interest"
    );
    assert_eq!(events[0].data.profile_delta[0].attributes.topic, "work");
}

/// Poll until `cond` holds, panicking after ~5s.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

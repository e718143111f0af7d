use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use recall_core::config::{FlushConfig, MemoryConfig};
use recall_core::project::ProfileConfig;
use recall_core::types::{BlobType, BufferStatus, FlushResult};
use recall_core::MemoryError;
use recall_coord::{buffer_queue_key, pack_ids, unpack_ids, user_lock_key, LockRegistry, WorkQueues};
use recall_pipeline::{Consolidator, PipelineError};
use recall_store::blobs::BlobStore;
use recall_store::buffer::BufferStore;
use recall_store::projects::ProjectStore;

/// Pause between background iterations so one user cannot monopolise the
/// executor.
const ITERATION_PAUSE: Duration = Duration::from_millis(100);

/// Decides when a user's buffer is flushed and serializes the flushes.
///
/// One lock per (project, user, blob type) guards every flush; background
/// batches go through a FIFO queue drained by a best-effort worker, so
/// commits land in the order their batches were selected.
pub struct FlushScheduler {
    buffer: Arc<BufferStore>,
    blobs: Arc<BlobStore>,
    projects: Arc<ProjectStore>,
    locks: Arc<LockRegistry>,
    queues: Arc<WorkQueues>,
    consolidator: Arc<Consolidator>,
    memory: MemoryConfig,
    flush: FlushConfig,
    shutdown: CancellationToken,
}

impl FlushScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buffer: Arc<BufferStore>,
        blobs: Arc<BlobStore>,
        projects: Arc<ProjectStore>,
        locks: Arc<LockRegistry>,
        queues: Arc<WorkQueues>,
        consolidator: Arc<Consolidator>,
        memory: MemoryConfig,
        flush: FlushConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            blobs,
            projects,
            locks,
            queues,
            consolidator,
            memory,
            flush,
            shutdown,
        }
    }

    fn scope(blob_type: BlobType) -> String {
        format!("flush_{blob_type}")
    }

    /// Entry point after a blob lands in the buffer. `wait` runs a
    /// synchronous flush of everything idle; otherwise a background flush is
    /// kicked off when the buffer crossed its size trigger.
    pub async fn on_enqueue(
        self: &Arc<Self>,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        wait: bool,
    ) -> Result<Option<FlushResult>, MemoryError> {
        if wait {
            return self.flush_sync(project_id, user_id, blob_type).await;
        }
        let idle_tokens = self
            .buffer
            .token_sum(project_id, user_id, blob_type, BufferStatus::Idle)?;
        if idle_tokens as usize > self.memory.max_buffer_tokens {
            info!(
                user_id,
                idle_tokens,
                max = self.memory.max_buffer_tokens,
                "buffer over size trigger, scheduling background flush"
            );
            let ids =
                self.buffer
                    .pending_ids(project_id, user_id, blob_type, BufferStatus::Idle)?;
            self.spawn_background(project_id, user_id, blob_type, &ids)?;
        }
        Ok(None)
    }

    /// Run exactly one batch while holding the user lock, returning the
    /// commit result. `Ok(None)` means there was nothing to flush.
    #[instrument(skip(self), fields(project_id, user_id, %blob_type))]
    pub async fn flush_sync(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
    ) -> Result<Option<FlushResult>, MemoryError> {
        if blob_type != BlobType::Chat {
            return Err(MemoryError::BadRequest(format!(
                "blob type {blob_type} cannot be flushed"
            )));
        }
        let ids = self
            .buffer
            .pending_ids(project_id, user_id, blob_type, BufferStatus::Idle)?;
        if ids.is_empty() {
            return Ok(None);
        }
        let config = self.projects.parsed_profile_config(project_id)?;

        let key = user_lock_key(project_id, &Self::scope(blob_type), user_id);
        let token = self
            .locks
            .acquire(
                &key,
                Duration::from_secs(self.flush.lock_ttl_secs),
                Duration::from_secs(self.flush.lock_block_secs),
            )
            .await
            .ok_or_else(|| {
                MemoryError::Conflict(format!("user {user_id} is already being flushed"))
            })?;

        let result = self
            .run_batch(project_id, user_id, blob_type, &ids, BufferStatus::Idle, &config)
            .await;
        self.locks.release(&key, &token);
        result.map_err(MemoryError::from)
    }

    /// Claim the given idle entries, enqueue them as one batch, and make sure
    /// a worker is draining this user's queue.
    pub fn spawn_background(
        self: &Arc<Self>,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        entry_ids: &[String],
    ) -> Result<(), MemoryError> {
        if blob_type != BlobType::Chat {
            return Err(MemoryError::BadRequest(format!(
                "blob type {blob_type} cannot be flushed"
            )));
        }
        let claimed = self.buffer.claim(entry_ids, BufferStatus::Idle)?;
        if claimed.is_empty() {
            return Ok(());
        }
        let queue_key = buffer_queue_key(project_id, &Self::scope(blob_type), user_id);
        self.queues.push(&queue_key, pack_ids(&claimed));
        debug!(
            user_id,
            batch = claimed.len(),
            queued = self.queues.len(&queue_key),
            "background batch enqueued"
        );

        let scheduler = self.clone();
        let project_id = project_id.to_string();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            scheduler.worker(&project_id, &user_id, blob_type).await;
        });
        Ok(())
    }

    /// Best-effort queue drainer. Gives up silently when another worker holds
    /// the lock; otherwise drains one batch per iteration, renewing the lock
    /// between batches, until the queue is empty or a budget runs out.
    async fn worker(&self, project_id: &str, user_id: &str, blob_type: BlobType) {
        let scope = Self::scope(blob_type);
        let lock_key = user_lock_key(project_id, &scope, user_id);
        let queue_key = buffer_queue_key(project_id, &scope, user_id);
        let ttl = Duration::from_secs(self.flush.lock_ttl_secs);

        let Some(token) = self.locks.try_acquire(&lock_key, ttl) else {
            debug!(user_id, "flush worker already active");
            return;
        };
        let config = match self.projects.parsed_profile_config(project_id) {
            Ok(c) => c,
            Err(e) => {
                error!(user_id, error = %e, "worker cannot load project config");
                self.locks.release(&lock_key, &token);
                return;
            }
        };

        let started = Instant::now();
        let max_total = Duration::from_secs(self.flush.max_total_time_secs);
        let mut iterations: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        while iterations < self.flush.max_iterations {
            if started.elapsed() > max_total {
                warn!(user_id, "worker exceeded total time budget");
                break;
            }
            if self.shutdown.is_cancelled() {
                info!(user_id, "worker stopping on shutdown");
                break;
            }
            if !self.locks.is_held_by(&lock_key, &token) {
                warn!(user_id, "worker lost its lock, stopping");
                break;
            }
            let Some(batch) = self.queues.pop(&queue_key) else {
                break;
            };
            self.locks.renew(&lock_key, &token, ttl);

            let ids = unpack_ids(&batch);
            if ids.is_empty() {
                continue;
            }
            debug!(
                user_id,
                iteration = iterations,
                remaining = self.queues.len(&queue_key),
                "worker processing batch"
            );
            match self
                .run_batch(
                    project_id,
                    user_id,
                    blob_type,
                    &ids,
                    BufferStatus::Processing,
                    &config,
                )
                .await
            {
                Ok(_) => consecutive_errors = 0,
                Err(e) => {
                    warn!(user_id, error = %e, "background batch failed");
                    consecutive_errors += 1;
                    if consecutive_errors >= self.flush.max_consecutive_errors {
                        error!(
                            user_id,
                            consecutive_errors, "too many consecutive failures, worker stopping"
                        );
                        break;
                    }
                }
            }
            tokio::time::sleep(ITERATION_PAUSE).await;
            iterations += 1;
        }

        self.locks.release(&lock_key, &token);
        info!(
            user_id,
            iterations,
            elapsed_s = started.elapsed().as_secs(),
            "flush worker finished"
        );
    }

    /// Process one batch through the pipeline and settle the buffer entries:
    /// `done` (plus chat-blob GC) on success, `failed` on any error.
    async fn run_batch(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        entry_ids: &[String],
        expect_status: BufferStatus,
        config: &ProfileConfig,
    ) -> Result<Option<FlushResult>, PipelineError> {
        let batch = self
            .buffer
            .take_batch(project_id, user_id, blob_type, entry_ids, expect_status)?;
        if batch.is_empty() {
            debug!(user_id, "no matching buffer entries, nothing to flush");
            return Ok(None);
        }
        let claimed: Vec<String> = batch.iter().map(|b| b.entry_id.clone()).collect();
        let blob_ids: Vec<String> = batch.iter().map(|b| b.blob_id.clone()).collect();

        match self
            .consolidator
            .process_chat_blobs(project_id, user_id, &batch, config)
            .await
        {
            Ok(result) => {
                self.buffer.mark(&claimed, BufferStatus::Done)?;
                if !self.memory.persist_chat_blobs {
                    self.blobs.gc_consolidated(project_id, user_id, &blob_ids)?;
                }
                Ok(Some(result))
            }
            Err(e) => {
                warn!(user_id, error = %e, "flush failed, batch marked failed");
                self.buffer.mark(&claimed, BufferStatus::Failed)?;
                Err(e)
            }
        }
    }
}

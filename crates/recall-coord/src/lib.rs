//! In-process coordination primitives: named TTL locks, per-user FIFO work
//! queues, and the profile-list cache.
//!
//! The contracts mirror what a networked coordination store would provide
//! (value-token compare-and-delete release, TTL expiry reclaim, FIFO pops),
//! so the registries can be swapped for one without touching callers.

pub mod cache;
pub mod lock;
pub mod queue;

pub use cache::Cache;
pub use lock::LockRegistry;
pub use queue::{pack_ids, unpack_ids, WorkQueues};

/// Key for the per-user flush lock.
pub fn user_lock_key(project_id: &str, scope: &str, user_id: &str) -> String {
    format!("user_lock:{project_id}:{scope}:{user_id}")
}

/// Key for the per-user background flush queue.
pub fn buffer_queue_key(project_id: &str, scope: &str, user_id: &str) -> String {
    format!("buffer_queue:{project_id}:{scope}:{user_id}")
}

/// Key under which a user's profile list is cached.
pub fn profile_cache_key(project_id: &str, user_id: &str) -> String {
    format!("profiles::{project_id}::{user_id}")
}

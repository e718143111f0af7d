use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// Named exclusive locks with TTL-based crash recovery.
///
/// Each successful acquisition mints a unique token; release and renewal are
/// compare-and-delete/compare-and-swap on that token, so a holder whose lock
/// expired and was re-acquired by someone else cannot release or extend the
/// new holder's lock.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, LockEntry>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single non-blocking attempt. Returns the holder token on success.
    /// An expired entry counts as free and is taken over.
    pub fn try_acquire(&self, key: &str, ttl: Duration) -> Option<String> {
        let token = Uuid::new_v4().to_string();
        let now = Instant::now();
        match self.locks.entry(key.to_string()) {
            Entry::Vacant(v) => {
                v.insert(LockEntry {
                    token: token.clone(),
                    expires_at: now + ttl,
                });
                Some(token)
            }
            Entry::Occupied(mut o) => {
                if o.get().expires_at <= now {
                    debug!(key, "reclaiming expired lock");
                    o.insert(LockEntry {
                        token: token.clone(),
                        expires_at: now + ttl,
                    });
                    Some(token)
                } else {
                    None
                }
            }
        }
    }

    /// Blocking acquisition, bounded by `block_timeout`.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        block_timeout: Duration,
    ) -> Option<String> {
        let deadline = Instant::now() + block_timeout;
        loop {
            if let Some(token) = self.try_acquire(key, ttl) {
                return Some(token);
            }
            if Instant::now() >= deadline {
                warn!(key, "lock acquisition timed out");
                return None;
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Extend the TTL. Fails if the caller no longer holds the lock.
    pub fn renew(&self, key: &str, token: &str, ttl: Duration) -> bool {
        match self.locks.get_mut(key) {
            Some(mut entry) if entry.token == token && entry.expires_at > Instant::now() => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    /// Whether `token` still owns the (unexpired) lock.
    pub fn is_held_by(&self, key: &str, token: &str) -> bool {
        self.locks
            .get(key)
            .map(|e| e.token == token && e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Compare-and-delete release. Idempotent: releasing an already-expired
    /// or re-acquired lock is a no-op returning false.
    pub fn release(&self, key: &str, token: &str) -> bool {
        self.locks
            .remove_if(key, |_, entry| entry.token == token)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn exclusive_while_held() {
        let locks = LockRegistry::new();
        let token = locks.try_acquire("user:a", TTL).unwrap();
        assert!(locks.try_acquire("user:a", TTL).is_none());
        assert!(locks.try_acquire("user:b", TTL).is_some());
        assert!(locks.release("user:a", &token));
        assert!(locks.try_acquire("user:a", TTL).is_some());
    }

    #[test]
    fn expired_lock_is_reclaimable() {
        let locks = LockRegistry::new();
        let stale = locks
            .try_acquire("user:a", Duration::from_millis(1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let fresh = locks.try_acquire("user:a", TTL).unwrap();
        // stale holder can no longer release, renew, or claim ownership
        assert!(!locks.release("user:a", &stale));
        assert!(!locks.renew("user:a", &stale, TTL));
        assert!(!locks.is_held_by("user:a", &stale));
        assert!(locks.is_held_by("user:a", &fresh));
    }

    #[test]
    fn release_is_compare_and_delete() {
        let locks = LockRegistry::new();
        let token = locks.try_acquire("k", TTL).unwrap();
        assert!(!locks.release("k", "someone-else"));
        assert!(locks.is_held_by("k", &token));
        assert!(locks.release("k", &token));
        assert!(!locks.release("k", &token)); // idempotent
    }

    #[tokio::test]
    async fn blocking_acquire_times_out_then_succeeds() {
        let locks = LockRegistry::new();
        let token = locks.try_acquire("k", TTL).unwrap();
        assert!(
            locks
                .acquire("k", TTL, Duration::from_millis(120))
                .await
                .is_none()
        );
        locks.release("k", &token);
        assert!(
            locks
                .acquire("k", TTL, Duration::from_millis(120))
                .await
                .is_some()
        );
    }

    #[test]
    fn renew_extends_ttl() {
        let locks = LockRegistry::new();
        let token = locks
            .try_acquire("k", Duration::from_millis(60))
            .unwrap();
        assert!(locks.renew("k", &token, TTL));
        std::thread::sleep(Duration::from_millis(80));
        // would have expired without the renewal
        assert!(locks.is_held_by("k", &token));
    }
}

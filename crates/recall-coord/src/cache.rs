use std::time::{Duration, Instant};

use dashmap::DashMap;

/// TTL string cache. Used as the write-through cache in front of the profile
/// store; values are serialized JSON and never authoritative.
#[derive(Default)]
pub struct Cache {
    entries: DashMap<String, (String, Instant)>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

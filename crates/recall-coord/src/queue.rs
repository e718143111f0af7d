use std::collections::VecDeque;

use dashmap::DashMap;

const ID_SEPARATOR: &str = "::";

/// Per-key FIFO work queues. The flush scheduler enqueues one batch (a packed
/// list of buffer-entry ids) per push; workers drain one batch per pop.
#[derive(Default)]
pub struct WorkQueues {
    queues: DashMap<String, VecDeque<String>>,
}

impl WorkQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: &str, batch: String) {
        self.queues
            .entry(key.to_string())
            .or_default()
            .push_back(batch);
    }

    pub fn pop(&self, key: &str) -> Option<String> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }

    pub fn len(&self, key: &str) -> usize {
        self.queues.get(key).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }
}

/// Pack a batch of ids into one queue element.
pub fn pack_ids(ids: &[String]) -> String {
    ids.join(ID_SEPARATOR)
}

/// Inverse of [`pack_ids`]; blank fragments are skipped.
pub fn unpack_ids(packed: &str) -> Vec<String> {
    packed
        .split(ID_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_per_key() {
        let q = WorkQueues::new();
        q.push("u1", "a".into());
        q.push("u1", "b".into());
        q.push("u2", "x".into());
        assert_eq!(q.len("u1"), 2);
        assert_eq!(q.pop("u1").as_deref(), Some("a"));
        assert_eq!(q.pop("u1").as_deref(), Some("b"));
        assert_eq!(q.pop("u1"), None);
        assert_eq!(q.pop("u2").as_deref(), Some("x"));
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let ids = vec!["id-1".to_string(), "id-2".to_string()];
        assert_eq!(unpack_ids(&pack_ids(&ids)), ids);
        assert!(unpack_ids("").is_empty());
        assert_eq!(unpack_ids("a:::: b"), vec!["a".to_string(), "b".to_string()]);
    }
}

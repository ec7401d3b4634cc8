//! 捕获缓存 - 所有轮询方共享的短期快照

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    captured_at: Instant,
}

/// 每个会话最近捕获的文本，`ttl` 内有效
pub struct CaptureCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CaptureCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 缓存文本，未命中或过期时返回 `None`
    pub fn get(&self, session: &str) -> Option<String> {
        self.get_at(session, Instant::now())
    }

    /// Lookup at a given instant (expired entries are evicted)
    pub fn get_at(&self, session: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries();
        let fresh = match entries.get(session) {
            Some(entry) => now.saturating_duration_since(entry.captured_at) < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(session).map(|entry| entry.text.clone())
        } else {
            entries.remove(session);
            None
        }
    }

    /// Replace the whole cache; sessions absent from `captures` are evicted
    pub fn set_all(&self, captures: HashMap<String, String>) {
        self.set_all_at(captures, Instant::now());
    }

    pub fn set_all_at(&self, captures: HashMap<String, String>, now: Instant) {
        let fresh = captures
            .into_iter()
            .map(|(session, text)| (session, CacheEntry { text, captured_at: now }))
            .collect();
        *self.entries() = fresh;
    }

    /// Seed a single session
    pub fn insert(&self, session: &str, text: String) {
        self.insert_at(session, text, Instant::now());
    }

    pub fn insert_at(&self, session: &str, text: String, now: Instant) {
        self.entries().insert(
            session.to_string(),
            CacheEntry {
                text,
                captured_at: now,
            },
        );
    }

    pub fn remove(&self, session: &str) {
        self.entries().remove(session);
    }

    /// Drop expired entries of sessions nobody reads any more
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.captured_at) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

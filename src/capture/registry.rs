//! 活跃会话登记 - 当前正在被观察的会话

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Sessions polled within `window`; batch captures are scoped to these
pub struct ActiveRegistry {
    window: Duration,
    last_polled: Mutex<HashMap<String, Instant>>,
}

impl ActiveRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_polled: Mutex::new(HashMap::new()),
        }
    }

    fn last_polled(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.last_polled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 记录一次对 `session` 的轮询
    pub fn touch(&self, session: &str) {
        self.touch_at(session, Instant::now());
    }

    pub fn touch_at(&self, session: &str, now: Instant) {
        self.last_polled().insert(session.to_string(), now);
    }

    /// Currently active sessions, sorted; stale entries are evicted
    pub fn active_sessions(&self) -> Vec<String> {
        self.active_sessions_at(Instant::now())
    }

    pub fn active_sessions_at(&self, now: Instant) -> Vec<String> {
        let mut last_polled = self.last_polled();
        last_polled.retain(|_, at| now.saturating_duration_since(*at) < self.window);
        let mut sessions: Vec<String> = last_polled.keys().cloned().collect();
        sessions.sort();
        sessions
    }

    pub fn is_active_at(&self, session: &str, now: Instant) -> bool {
        self.last_polled()
            .get(session)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.window)
    }

    pub fn remove(&self, session: &str) {
        self.last_polled().remove(session);
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut last_polled = self.last_polled();
        let before = last_polled.len();
        last_polled.retain(|_, at| now.saturating_duration_since(*at) < self.window);
        before - last_polled.len()
    }

    pub fn len(&self) -> usize {
        self.last_polled().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_polled().is_empty()
    }
}

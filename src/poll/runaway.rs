//! 失控保护 - 降低持续刷屏会话的轮询频率

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::RunawayConfig;

/// 单个会话的内容变化历史
///
/// 限流只拉长轮询间隔，不丢弃任何输出。
#[derive(Debug, Clone)]
pub struct RunawayGuard {
    /// Timestamps of the most recent content changes
    changes: VecDeque<Instant>,
    max_polls: usize,
    window: Duration,
    settle_polls: u32,
    throttled: bool,
    unchanged: u32,
}

impl RunawayGuard {
    pub fn new(config: &RunawayConfig) -> Self {
        Self {
            changes: VecDeque::with_capacity(config.max_polls),
            max_polls: config.max_polls,
            window: config.window(),
            settle_polls: config.settle_polls,
            throttled: false,
            unchanged: 0,
        }
    }

    pub fn record_change(&mut self) -> bool {
        self.record_change_at(Instant::now())
    }

    /// Record a poll whose content changed; true when this change starts throttling
    pub fn record_change_at(&mut self, now: Instant) -> bool {
        self.unchanged = 0;
        if self.max_polls == 0 {
            return false;
        }

        if self.changes.len() == self.max_polls {
            self.changes.pop_front();
        }
        self.changes.push_back(now);

        if self.throttled || self.changes.len() < self.max_polls {
            return false;
        }

        let span = match self.changes.front() {
            Some(first) => now.saturating_duration_since(*first),
            None => return false,
        };
        if span <= self.window {
            self.throttled = true;
            return true;
        }
        false
    }

    /// Record a poll whose content did not change; true when this releases the throttle
    pub fn record_unchanged(&mut self) -> bool {
        self.unchanged = self.unchanged.saturating_add(1);
        if self.throttled && self.unchanged >= self.settle_polls {
            self.reset();
            return true;
        }
        false
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    pub fn reset(&mut self) {
        self.changes.clear();
        self.throttled = false;
        self.unchanged = 0;
    }
}

//! In-memory multiplexer shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use pane_watch::config::RuntimeConfig;
use pane_watch::{CaptureOptions, CursorCapture, CursorState, Multiplexer, MuxError, MuxResult};

/// What the fake received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Key(String, String),
    Literal(String, String),
    Paste(String, String),
}

#[derive(Default)]
pub struct FakeMux {
    screens: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<Sent>>,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    delay: Option<Duration>,
    first_send_delay: Option<Duration>,
    sent_once: AtomicBool,
    fail_batch: bool,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold the very first send back for `delay`
    pub fn with_first_send_delay(mut self, delay: Duration) -> Self {
        self.first_send_delay = Some(delay);
        self
    }

    pub fn with_failing_batch(mut self) -> Self {
        self.fail_batch = true;
        self
    }

    pub fn set_screen(&self, session: &str, text: &str) {
        self.screens
            .lock()
            .unwrap()
            .insert(session.to_string(), text.to_string());
    }

    pub fn remove(&self, session: &str) {
        self.screens.lock().unwrap().remove(session);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn singles(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn screen(&self, target: &str) -> MuxResult<String> {
        let session = target.trim_start_matches('%');
        self.screens
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .ok_or_else(|| MuxError::NotFound {
                target: target.to_string(),
            })
    }

    async fn record(&self, target: &str, sent: Sent) -> MuxResult<()> {
        if let Some(delay) = self.first_send_delay {
            if !self.sent_once.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(delay).await;
            }
        }
        self.screen(target)?;
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn capture(&self, target: &str, _options: CaptureOptions) -> MuxResult<String> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.screen(target)
    }

    async fn capture_with_cursor(
        &self,
        target: &str,
        _options: CaptureOptions,
    ) -> MuxResult<CursorCapture> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(CursorCapture {
            text: self.screen(target)?,
            cursor: CursorState {
                row: 1,
                col: 2,
                visible: true,
                pane_width: 80,
                pane_height: 24,
            },
        })
    }

    async fn capture_batch(
        &self,
        sessions: &[String],
        _options: CaptureOptions,
    ) -> MuxResult<HashMap<String, String>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_batch {
            return Err(MuxError::Malformed("missing delimiter".to_string()));
        }
        let screens = self.screens.lock().unwrap();
        Ok(sessions
            .iter()
            .filter_map(|s| screens.get(s).map(|t| (s.clone(), t.clone())))
            .collect())
    }

    async fn send_key(&self, target: &str, key: &str) -> MuxResult<()> {
        self.record(target, Sent::Key(target.to_string(), key.to_string()))
            .await
    }

    async fn send_literal(&self, target: &str, text: &str) -> MuxResult<()> {
        self.record(target, Sent::Literal(target.to_string(), text.to_string()))
            .await
    }

    async fn paste(&self, target: &str, text: &str) -> MuxResult<()> {
        self.record(target, Sent::Paste(target.to_string(), text.to_string()))
            .await
    }

    async fn pane_id(&self, session: &str) -> MuxResult<String> {
        self.screen(session)?;
        Ok(format!("%{}", session))
    }

    async fn prefix_key(&self) -> MuxResult<String> {
        Ok("C-b".to_string())
    }

    async fn has_session(&self, session: &str) -> bool {
        self.screen(session).is_ok()
    }

    async fn list_sessions(&self) -> MuxResult<Vec<String>> {
        let mut names: Vec<String> = self.screens.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn new_session(&self, session: &str, _working_dir: &Path, _command: &str) -> MuxResult<()> {
        self.set_screen(session, "");
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> MuxResult<()> {
        self.screen(session)?;
        self.remove(session);
        Ok(())
    }
}

/// Short intervals so the tests finish quickly on real time
pub fn fast_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.poll.hidden_ms = 20;
    config.poll.visible_busy_ms = 20;
    config.poll.visible_idle_ms = 20;
    config.poll.focused_busy_ms = 20;
    config.poll.focused_idle_ms = 20;
    config.poll.interactive_ms = 10;
    config.poll.interactive_idle_ms = 20;
    config.poll.stagger_max_ms = 0;
    config.cache.ttl_ms = 5;
    config.interactive.escape_window_ms = 50;
    config
}

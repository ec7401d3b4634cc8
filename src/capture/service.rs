//! Capture service - cache first, then one batch for every active session

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::batch::{BatchCoordinator, BatchOutcome};
use super::cache::CaptureCache;
use super::registry::ActiveRegistry;
use crate::config::RuntimeConfig;
use crate::error::{MuxError, MuxResult};
use crate::infra::mux::{CaptureOptions, CursorCapture, Multiplexer};
use crate::infra::terminal::trim_to_byte_budget;

pub struct CaptureService {
    mux: Arc<dyn Multiplexer>,
    cache: CaptureCache,
    registry: ActiveRegistry,
    coordinator: BatchCoordinator,
    options: CaptureOptions,
    interactive_options: CaptureOptions,
    max_bytes: usize,
    min_batch_peers: usize,
}

impl CaptureService {
    pub fn new(mux: Arc<dyn Multiplexer>, config: &RuntimeConfig) -> Self {
        let capture = &config.capture;
        let options = CaptureOptions {
            history_lines: capture.history_lines,
            join_wrapped: capture.join_wrapped,
            escape_sequences: capture.escape_sequences,
        };
        Self {
            mux,
            cache: CaptureCache::new(config.cache.ttl()),
            registry: ActiveRegistry::new(config.cache.active_window()),
            coordinator: BatchCoordinator::new(),
            options,
            interactive_options: CaptureOptions {
                escape_sequences: capture.interactive_escape_sequences,
                ..options
            },
            max_bytes: capture.max_bytes,
            min_batch_peers: capture.min_batch_peers,
        }
    }

    pub fn cache(&self) -> &CaptureCache {
        &self.cache
    }

    pub fn registry(&self) -> &ActiveRegistry {
        &self.registry
    }

    /// Current text of `session`
    ///
    /// Served from cache when fresh; otherwise one batch refreshes every active
    /// session and concurrent callers share its result.
    pub async fn capture_one(&self, session: &str) -> MuxResult<String> {
        self.registry.touch(session);

        if let Some(text) = self.cache.get(session) {
            return Ok(text);
        }

        let peers = self.registry.active_sessions();
        if peers.len() < self.min_batch_peers {
            return self.capture_direct(session).await;
        }

        match self
            .coordinator
            .run_batch(|| self.capture_batch(&peers))
            .await
        {
            BatchOutcome::Ran(Ok(())) | BatchOutcome::Joined => {
                if let Some(text) = self.cache.get(session) {
                    return Ok(text);
                }
                debug!(session = %session, "Not in batch result, capturing directly");
            }
            BatchOutcome::Ran(Err(e)) => {
                debug!(session = %session, peers = peers.len(), error = %e, "Batch capture failed, falling back");
            }
        }

        self.capture_direct(session).await
    }

    /// Capture `sessions` in one invocation and replace the cache with the result
    pub async fn capture_batch(&self, sessions: &[String]) -> MuxResult<()> {
        let captures = match self.mux.capture_batch(sessions, self.options).await {
            Ok(captures) => captures,
            Err(e @ MuxError::Malformed(_)) => {
                warn!(sessions = sessions.len(), error = %e, "Malformed batch response");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let bounded: HashMap<String, String> = captures
            .into_iter()
            .map(|(session, text)| (session, self.bounded(text)))
            .collect();
        debug!(sessions = bounded.len(), "Batch capture stored");
        self.cache.set_all(bounded);
        Ok(())
    }

    /// Single-session capture that bypasses the coordinator
    pub async fn capture_direct(&self, session: &str) -> MuxResult<String> {
        match self.mux.capture(session, self.options).await {
            Ok(text) => {
                let text = self.bounded(text);
                self.cache.insert(session, text.clone());
                Ok(text)
            }
            Err(e) => {
                if e.is_not_found() {
                    self.forget(session);
                }
                Err(e)
            }
        }
    }

    /// Capture for the focused session: text plus cursor from the same invocation
    pub async fn capture_interactive(
        &self,
        session: &str,
        target: &str,
    ) -> MuxResult<CursorCapture> {
        self.registry.touch(session);

        let capture = match self
            .mux
            .capture_with_cursor(target, self.interactive_options)
            .await
        {
            Ok(capture) => capture,
            Err(e) => {
                if e.is_not_found() {
                    self.forget(session);
                }
                return Err(e);
            }
        };

        let text = self.bounded(capture.text);
        if self.interactive_options == self.options {
            self.cache.insert(session, text.clone());
        }
        Ok(CursorCapture {
            text,
            cursor: capture.cursor,
        })
    }

    /// Drop every trace of `session`
    pub fn forget(&self, session: &str) {
        self.cache.remove(session);
        self.registry.remove(session);
    }

    /// Periodic sweep of expired cache entries and stale registry entries
    pub fn sweep(&self) -> (usize, usize) {
        let now = std::time::Instant::now();
        (self.cache.cleanup_at(now), self.registry.cleanup_at(now))
    }

    fn bounded(&self, text: String) -> String {
        if text.len() <= self.max_bytes {
            text
        } else {
            trim_to_byte_budget(&text, self.max_bytes).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::mux::CursorState;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScreenMux {
        screens: Mutex<HashMap<String, String>>,
        single: AtomicUsize,
        batch: AtomicUsize,
    }

    impl ScreenMux {
        fn with(pairs: &[(&str, &str)]) -> Self {
            let mux = Self::default();
            for (session, text) in pairs {
                mux.screens
                    .lock()
                    .unwrap()
                    .insert(session.to_string(), text.to_string());
            }
            mux
        }

        fn screen(&self, target: &str) -> MuxResult<String> {
            self.screens
                .lock()
                .unwrap()
                .get(target)
                .cloned()
                .ok_or_else(|| MuxError::NotFound {
                    target: target.to_string(),
                })
        }
    }

    #[async_trait]
    impl Multiplexer for ScreenMux {
        async fn capture(&self, target: &str, _: CaptureOptions) -> MuxResult<String> {
            self.single.fetch_add(1, Ordering::SeqCst);
            self.screen(target)
        }

        async fn capture_with_cursor(
            &self,
            target: &str,
            _: CaptureOptions,
        ) -> MuxResult<CursorCapture> {
            Ok(CursorCapture {
                text: self.screen(target)?,
                cursor: CursorState::default(),
            })
        }

        async fn capture_batch(
            &self,
            sessions: &[String],
            _: CaptureOptions,
        ) -> MuxResult<HashMap<String, String>> {
            self.batch.fetch_add(1, Ordering::SeqCst);
            sessions
                .iter()
                .map(|s| self.screen(s).map(|text| (s.clone(), text)))
                .collect()
        }

        async fn send_key(&self, _: &str, _: &str) -> MuxResult<()> {
            Ok(())
        }
        async fn send_literal(&self, _: &str, _: &str) -> MuxResult<()> {
            Ok(())
        }
        async fn paste(&self, _: &str, _: &str) -> MuxResult<()> {
            Ok(())
        }
        async fn pane_id(&self, _: &str) -> MuxResult<String> {
            Ok("%0".into())
        }
        async fn prefix_key(&self) -> MuxResult<String> {
            Ok("C-b".into())
        }
        async fn has_session(&self, session: &str) -> bool {
            self.screen(session).is_ok()
        }
        async fn list_sessions(&self) -> MuxResult<Vec<String>> {
            Ok(self.screens.lock().unwrap().keys().cloned().collect())
        }
        async fn new_session(&self, _: &str, _: &Path, _: &str) -> MuxResult<()> {
            Ok(())
        }
        async fn kill_session(&self, _: &str) -> MuxResult<()> {
            Ok(())
        }
    }

    fn service(mux: Arc<ScreenMux>, config: &RuntimeConfig) -> CaptureService {
        CaptureService::new(mux, config)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_tmux() {
        let mux = Arc::new(ScreenMux::with(&[("a", "alpha")]));
        let service = service(mux.clone(), &RuntimeConfig::default());

        assert_eq!(service.capture_one("a").await.unwrap(), "alpha");
        assert_eq!(service.capture_one("a").await.unwrap(), "alpha");
        assert_eq!(mux.single.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_serves_peers() {
        let mux = Arc::new(ScreenMux::with(&[("a", "alpha"), ("b", "beta")]));
        let service = service(mux.clone(), &RuntimeConfig::default());
        service.registry().touch("b");

        assert_eq!(service.capture_one("a").await.unwrap(), "alpha");
        assert_eq!(service.capture_one("b").await.unwrap(), "beta");
        assert_eq!(mux.batch.load(Ordering::SeqCst), 1);
        assert_eq!(mux.single.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_captured_text_is_trimmed() {
        let long = (0..200).map(|i| format!("row {}", i)).collect::<Vec<_>>().join("\n");
        let mux = Arc::new(ScreenMux::with(&[("a", long.as_str())]));
        let mut config = RuntimeConfig::default();
        config.capture.max_bytes = 64;
        let service = service(mux, &config);

        let text = service.capture_one("a").await.unwrap();
        assert!(text.len() <= 64);
        assert!(text.starts_with("row "));
        assert!(text.ends_with("row 199"));
    }

    #[tokio::test]
    async fn test_missing_session_is_forgotten() {
        let mux = Arc::new(ScreenMux::default());
        let service = service(mux, &RuntimeConfig::default());

        let err = service.capture_one("gone").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_interactive_capture_does_not_seed_plain_cache() {
        let mux = Arc::new(ScreenMux::with(&[("a", "alpha")]));
        let service = service(mux, &RuntimeConfig::default());

        let capture = service.capture_interactive("a", "a").await.unwrap();
        assert_eq!(capture.text, "alpha");
        assert!(service.cache().get("a").is_none());
    }
}

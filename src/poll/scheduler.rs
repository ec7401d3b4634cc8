//! Poll scheduler - adaptive intervals and generation-tagged timers

use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::PollConfig;
use crate::infra::terminal::stable_hash;
use crate::message::RuntimeMessage;
use crate::status::Status;

/// How prominently the host shows a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
    /// Visible and selected
    Focused,
}

pub struct PollScheduler {
    config: PollConfig,
    tx: UnboundedSender<RuntimeMessage>,
}

impl PollScheduler {
    pub fn new(config: PollConfig, tx: UnboundedSender<RuntimeMessage>) -> Self {
        Self { config, tx }
    }

    /// Background interval from status, visibility and throttle state
    pub fn interval(&self, status: &Status, visibility: Visibility, throttled: bool) -> Duration {
        let c = &self.config;
        let busy = !status.is_idle();
        let ms = match (visibility, busy) {
            (Visibility::Hidden, _) => c.hidden_ms,
            (Visibility::Visible, true) => c.visible_busy_ms,
            (Visibility::Visible, false) => c.visible_idle_ms,
            (Visibility::Focused, true) => c.focused_busy_ms,
            (Visibility::Focused, false) => c.focused_idle_ms,
        };
        let ms = if throttled { ms.max(c.throttled_ms) } else { ms };
        Duration::from_millis(ms)
    }

    /// Interval for the interactive session; slows down once typing stops
    pub fn interactive_interval(&self, last_key: Option<Instant>, now: Instant) -> Duration {
        let c = &self.config;
        let typing = last_key.is_some_and(|at| {
            now.saturating_duration_since(at) < Duration::from_millis(c.interactive_decay_ms)
        });
        Duration::from_millis(if typing {
            c.interactive_ms
        } else {
            c.interactive_idle_ms
        })
    }

    /// Deterministic per-session offset in `[0, stagger_max)`
    pub fn stagger(&self, session: &str) -> Duration {
        if self.config.stagger_max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(stable_hash(session) % self.config.stagger_max_ms)
    }

    /// Fire `PollDue { session, generation }` after `delay`
    pub fn schedule(&self, session: &str, generation: u64, delay: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let session = session.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // receiver gone: host loop has shut down
            let _ = tx.send(RuntimeMessage::PollDue {
                session,
                generation,
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn scheduler() -> (PollScheduler, mpsc::UnboundedReceiver<RuntimeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PollScheduler::new(PollConfig::default(), tx), rx)
    }

    #[tokio::test]
    async fn test_interval_table() {
        let (s, _rx) = scheduler();
        let ms = |status: Status, vis, throttled| s.interval(&status, vis, throttled).as_millis();

        assert_eq!(ms(Status::Active, Visibility::Hidden, false), 5_000);
        assert_eq!(ms(Status::Active, Visibility::Visible, false), 1_000);
        assert_eq!(ms(Status::Done, Visibility::Visible, false), 2_000);
        assert_eq!(ms(Status::Thinking, Visibility::Focused, false), 250);
        assert_eq!(ms(Status::waiting("?"), Visibility::Focused, false), 1_000);
        assert_eq!(ms(Status::Active, Visibility::Focused, true), 3_000);
        assert_eq!(ms(Status::Active, Visibility::Hidden, true), 5_000);
    }

    #[tokio::test]
    async fn test_interactive_interval_decays() {
        let (s, _rx) = scheduler();
        let now = Instant::now();

        assert_eq!(s.interactive_interval(Some(now), now), Duration::from_millis(50));
        assert_eq!(
            s.interactive_interval(Some(now), now + Duration::from_millis(999)),
            Duration::from_millis(50)
        );
        assert_eq!(
            s.interactive_interval(Some(now), now + Duration::from_secs(1)),
            Duration::from_millis(250)
        );
        assert_eq!(s.interactive_interval(None, now), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_stagger_is_deterministic_and_bounded() {
        let (s, _rx) = scheduler();
        for name in ["cam-1", "cam-2", "agent-frontend", ""] {
            let stagger = s.stagger(name);
            assert_eq!(stagger, s.stagger(name));
            assert!(stagger < Duration::from_millis(120));
        }
    }

    #[tokio::test]
    async fn test_schedule_carries_generation() {
        let (s, mut rx) = scheduler();
        s.schedule("cam-1", 7, Duration::from_millis(5));

        match rx.recv().await {
            Some(RuntimeMessage::PollDue {
                session,
                generation,
            }) => {
                assert_eq!(session, "cam-1");
                assert_eq!(generation, 7);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

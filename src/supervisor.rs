//! Supervisor - owns tracked sessions and turns runtime messages into work
//!
//! The host runs one loop: receive a [`RuntimeMessage`], pass it to
//! [`Supervisor::handle`], render whatever comes back. All tmux work happens in
//! spawned tasks that report through the same channel.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::CaptureService;
use crate::config::RuntimeConfig;
use crate::error::MuxResult;
use crate::infra::mux::{CursorState, Multiplexer};
use crate::infra::terminal::stable_hash;
use crate::interactive::{InputEvent, InteractiveState, Outgoing, Passthrough, PassthroughAction};
use crate::message::RuntimeMessage;
use crate::poll::{PollScheduler, Visibility};
use crate::session::{Session, SessionSpec};
use crate::status::{MarkerSource, Status, StatusDetector};

/// Result of [`Supervisor::validate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Tracked sessions tmux no longer has; they have been cleaned up
    pub stopped: Vec<String>,
    /// Live sessions nobody tracks
    pub untracked: Vec<String>,
}

/// What [`Supervisor::handle_input`] did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveOutcome {
    /// No session has input focus
    Inactive,
    Forwarded { snap_back: bool },
    /// Escape held back until the exit window passes
    Pending,
    Dropped(&'static str),
    Exited,
    Scrolled { offset: u32 },
}

pub struct Supervisor {
    config: RuntimeConfig,
    mux: Arc<dyn Multiplexer>,
    capture: Arc<CaptureService>,
    detector: Arc<StatusDetector>,
    scheduler: PollScheduler,
    sessions: HashMap<String, Session>,
    interactive: Option<Passthrough>,
    /// Ordered send queue of the interactive session
    send_queue: Option<UnboundedSender<SendUnit>>,
    tx: UnboundedSender<RuntimeMessage>,
}

/// Inputs from one event, tagged with the generation they were issued under
struct SendUnit {
    generation: u64,
    inputs: Vec<Outgoing>,
}

impl Supervisor {
    pub fn new(
        config: RuntimeConfig,
        mux: Arc<dyn Multiplexer>,
        markers: Arc<dyn MarkerSource>,
    ) -> (Self, UnboundedReceiver<RuntimeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            capture: Arc::new(CaptureService::new(mux.clone(), &config)),
            detector: Arc::new(StatusDetector::new(&config.status, markers)),
            scheduler: PollScheduler::new(config.poll.clone(), tx.clone()),
            sessions: HashMap::new(),
            interactive: None,
            send_queue: None,
            config,
            mux,
            tx,
        };
        (supervisor, rx)
    }

    pub fn capture_service(&self) -> &Arc<CaptureService> {
        &self.capture
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn status(&self, name: &str) -> Option<&Status> {
        self.sessions.get(name).map(|s| &s.status)
    }

    pub fn interactive(&self) -> Option<&Passthrough> {
        self.interactive.as_ref()
    }

    pub fn is_interactive(&self, name: &str) -> bool {
        self.interactive.as_ref().is_some_and(|p| p.session() == name)
    }

    // ---- lifecycle ----

    /// Start tracking a session; its first poll fires after its stagger
    pub fn track(&mut self, spec: SessionSpec) -> bool {
        if self.sessions.contains_key(&spec.name) {
            return false;
        }
        let name = spec.name.clone();
        info!(session = %name, dir = ?spec.working_dir, "Tracking session");
        self.sessions
            .insert(name.clone(), Session::new(spec, &self.config));
        let delay = self.scheduler.stagger(&name);
        self.arm_after(&name, delay);
        true
    }

    /// Track every live session (optionally only those starting with `prefix`)
    pub async fn adopt_live_sessions(&mut self, prefix: Option<&str>) -> MuxResult<Vec<String>> {
        let mut adopted = Vec::new();
        for name in self.mux.list_sessions().await? {
            if prefix.is_some_and(|p| !name.starts_with(p)) {
                continue;
            }
            if self.track(SessionSpec::new(name.clone())) {
                adopted.push(name);
            }
        }
        info!(count = adopted.len(), "Adopted live sessions");
        Ok(adopted)
    }

    /// Create a tmux session running `command` and track it
    pub async fn spawn_session(&mut self, spec: SessionSpec, command: &str) -> MuxResult<()> {
        let dir = spec
            .working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        self.mux.new_session(&spec.name, &dir, command).await?;
        self.track(spec);
        Ok(())
    }

    /// Kill the tmux session and forget it
    pub async fn kill_session(&mut self, name: &str) -> MuxResult<()> {
        match self.mux.kill_session(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(session = %name, "Session already gone"),
            Err(e) => return Err(e),
        }
        self.cleanup(name);
        Ok(())
    }

    /// Drop a session and everything cached for it
    pub fn cleanup(&mut self, name: &str) -> bool {
        self.capture.forget(name);
        if self.is_interactive(name) {
            self.drop_interactive();
        }
        let removed = self.sessions.remove(name).is_some();
        if removed {
            info!(session = %name, "Session cleaned up");
        }
        removed
    }

    /// Stop polling a session whose tmux side is gone but the host keeps showing
    pub fn mark_orphaned(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        session.orphaned = true;
        session.bump_generation();
        self.capture.forget(name);
        if self.is_interactive(name) {
            self.drop_interactive();
        }
        info!(session = %name, "Session orphaned");
        true
    }

    /// Identity reset: forget captured state and restart polling
    pub fn reconnect(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        session.orphaned = false;
        session.pane_id = None;
        session.reset_output();
        session.bump_generation();
        self.capture.forget(name);
        info!(session = %name, generation = session.generation(), "Session reconnected");
        self.arm_after(name, Duration::ZERO);
        true
    }

    pub fn pause(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        session.status = Status::Paused;
        session.bump_generation();
        true
    }

    pub fn resume(&mut self, name: &str) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        if session.status != Status::Paused {
            return false;
        }
        session.status = Status::Active;
        session.last_digest = None;
        self.rearm(name);
        true
    }

    /// For the interactive session this only changes what is restored on exit
    pub fn set_visibility(&mut self, name: &str, visibility: Visibility) {
        if let Some(p) = self.interactive.as_mut().filter(|p| p.session() == name) {
            p.state_mut().return_visibility = visibility;
            return;
        }
        let Some(session) = self.sessions.get_mut(name) else {
            return;
        };
        if session.visibility == visibility {
            return;
        }
        session.visibility = visibility;
        self.rearm(name);
    }

    /// Reconcile tracked sessions with tmux's live list
    pub async fn validate(&mut self) -> MuxResult<ValidationReport> {
        let live: HashSet<String> = self.mux.list_sessions().await?.into_iter().collect();

        let mut stopped: Vec<String> = self
            .sessions
            .values()
            .filter(|s| !s.orphaned && !live.contains(&s.name))
            .map(|s| s.name.clone())
            .collect();
        stopped.sort();
        for name in &stopped {
            self.cleanup(name);
        }

        let prefix = self.config.tmux.session_prefix.as_deref();
        let mut untracked: Vec<String> = live
            .into_iter()
            .filter(|name| !self.sessions.contains_key(name))
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .collect();
        untracked.sort();

        if !stopped.is_empty() {
            info!(stopped = ?stopped, "Sessions ended outside the runtime");
        }
        Ok(ValidationReport { stopped, untracked })
    }

    /// Periodic cache and registry sweep
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let capture = self.capture.clone();
        let every = self
            .config
            .cache
            .sweep_interval()
            .max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (entries, sessions) = capture.sweep();
                if entries + sessions > 0 {
                    debug!(entries, sessions, "Swept capture cache");
                }
            }
        })
    }

    // ---- polling ----

    fn next_delay(&self, session: &Session, now: Instant) -> Duration {
        if let Some(p) = self.interactive.as_ref().filter(|p| p.session() == session.name) {
            return self
                .scheduler
                .interactive_interval(p.state().last_key_at, now);
        }
        self.scheduler.interval(
            &session.status,
            session.visibility,
            session.runaway.is_throttled(),
        ) + self.scheduler.stagger(&session.name)
    }

    /// Schedule the next poll of the current generation
    fn arm(&self, name: &str) {
        if let Some(session) = self.sessions.get(name) {
            let delay = self.next_delay(session, Instant::now());
            self.arm_after(name, delay);
        }
    }

    fn arm_after(&self, name: &str, delay: Duration) {
        let Some(session) = self.sessions.get(name) else {
            return;
        };
        if session.orphaned || session.status == Status::Paused {
            return;
        }
        self.scheduler.schedule(name, session.generation(), delay);
    }

    /// Invalidate outstanding timers and start a new poll chain
    fn rearm(&mut self, name: &str) {
        self.rearm_after(name, None);
    }

    fn rearm_after(&mut self, name: &str, delay: Option<Duration>) {
        let Some(session) = self.sessions.get_mut(name) else {
            return;
        };
        session.bump_generation();
        match delay {
            Some(delay) => self.arm_after(name, delay),
            None => self.arm(name),
        }
    }

    fn is_current(&self, name: &str, generation: u64) -> bool {
        self.sessions
            .get(name)
            .is_some_and(|s| s.accepts(generation))
    }

    fn start_poll(&self, name: &str, generation: u64) {
        let Some(session) = self.sessions.get(name) else {
            debug!(session = %name, "Poll for untracked session");
            return;
        };
        if !session.accepts(generation) {
            debug!(session = %name, generation, live = session.generation(), "Dropping stale poll");
            return;
        }

        let job = PollJob {
            session: name.to_string(),
            generation,
            target: self
                .interactive
                .as_ref()
                .filter(|p| p.session() == name)
                .map(|p| p.target().to_string()),
            previous_digest: session.last_digest,
            previous_status: session.status.clone(),
            working_dir: session.working_dir.clone(),
        };
        let capture = self.capture.clone();
        let detector = self.detector.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = job.run(&capture, &detector).await;
            let _ = tx.send(message);
        });
    }

    /// Apply a poll result; false when it belongs to a stale generation
    fn apply_output(
        &mut self,
        name: &str,
        generation: u64,
        text: Option<&str>,
        digest: u64,
        status: &Status,
        cursor: Option<CursorState>,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(name) else {
            return false;
        };
        if !session.accepts(generation) {
            return false;
        }

        match text {
            Some(text) => {
                session.output.replace(text.to_string());
                session.last_digest = Some(digest);
                if session.runaway.record_change() {
                    warn!(session = %name, "Runaway output, throttling polls");
                }
            }
            None => {
                if session.runaway.record_unchanged() {
                    info!(session = %name, "Output settled, throttle released");
                }
            }
        }

        if session.status != *status {
            info!(session = %name, from = %session.status, to = %status, "Status changed");
            session.status = status.clone();
        }

        if let Some(p) = self.interactive.as_mut().filter(|p| p.session() == name) {
            if let Some(cursor) = cursor {
                p.state_mut().update_cursor(cursor);
            }
            if let Some(text) = text {
                p.state_mut().update_modes(text);
            }
        }
        true
    }

    /// Process one message; returns what the host should see
    pub fn handle(&mut self, message: RuntimeMessage) -> Option<RuntimeMessage> {
        match message {
            RuntimeMessage::PollDue {
                session,
                generation,
            } => {
                self.start_poll(&session, generation);
                None
            }
            RuntimeMessage::OutputChanged {
                session,
                generation,
                text,
                digest,
                status,
                cursor,
            } => {
                if !self.apply_output(&session, generation, Some(&text), digest, &status, cursor) {
                    return None;
                }
                self.arm(&session);
                Some(RuntimeMessage::OutputChanged {
                    session,
                    generation,
                    text,
                    digest,
                    status,
                    cursor,
                })
            }
            RuntimeMessage::OutputUnchanged {
                session,
                generation,
                status,
                cursor,
            } => {
                if !self.apply_output(&session, generation, None, 0, &status, cursor) {
                    return None;
                }
                self.arm(&session);
                Some(RuntimeMessage::OutputUnchanged {
                    session,
                    generation,
                    status,
                    cursor,
                })
            }
            RuntimeMessage::CaptureFailed {
                session,
                generation,
                error,
            } => {
                if self.is_current(&session, generation) {
                    debug!(session = %session, error = %error, "Capture failed, retrying at next interval");
                    self.arm(&session);
                }
                None
            }
            RuntimeMessage::SessionStopped {
                session,
                generation,
            } => {
                if !self.is_current(&session, generation) {
                    debug!(session = %session, generation, "Dropping stale stop");
                    return None;
                }
                info!(session = %session, "Session stopped");
                self.cleanup(&session);
                Some(RuntimeMessage::SessionStopped {
                    session,
                    generation,
                })
            }
            RuntimeMessage::SessionDead {
                session,
                generation,
            } => {
                if !self.is_current(&session, generation) {
                    debug!(session = %session, generation, "Dropping stale session death");
                    return None;
                }
                warn!(session = %session, "Interactive session died");
                self.cleanup(&session);
                Some(RuntimeMessage::SessionDead {
                    session,
                    generation,
                })
            }
            RuntimeMessage::PasteResult { session, result } => {
                if let Err(e) = &result {
                    debug!(session = %session, error = %e, "Paste failed");
                }
                Some(RuntimeMessage::PasteResult { session, result })
            }
            RuntimeMessage::EscapeTimeout { session, token } => {
                let action = self
                    .interactive
                    .as_mut()
                    .filter(|p| p.session() == session)
                    .and_then(|p| p.on_escape_timeout(token));
                if let Some(action) = action {
                    self.perform(action);
                }
                None
            }
        }
    }

    // ---- interactive ----

    /// Give `name` input focus
    pub async fn enter_interactive(&mut self, name: &str) -> MuxResult<bool> {
        if !self.sessions.contains_key(name) {
            return Ok(false);
        }
        self.exit_interactive();

        let pane = match self.mux.pane_id(name).await {
            Ok(pane) => Some(pane),
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                debug!(session = %name, error = %e, "Pane lookup failed, targeting session");
                None
            }
        };
        let prefix_key = self.mux.prefix_key().await.ok();

        let Some(session) = self.sessions.get_mut(name) else {
            return Ok(false);
        };
        if session.pane_id.is_some() && pane.is_some() && session.pane_id != pane {
            info!(session = %name, "Pane changed, resetting output");
            session.reset_output();
        }
        session.pane_id = pane.clone();
        let return_visibility = std::mem::replace(&mut session.visibility, Visibility::Focused);

        let target = pane.unwrap_or_else(|| name.to_string());
        let mut state = InteractiveState::new(name, target.clone());
        state.prefix_key = prefix_key;
        state.return_visibility = return_visibility;
        self.interactive = Some(Passthrough::new(state, self.config.interactive.clone()));
        self.send_queue = Some(self.spawn_send_worker(name.to_string(), target));

        info!(session = %name, "Entered interactive mode");
        self.rearm_after(name, Some(Duration::ZERO));
        Ok(true)
    }

    /// Drop input focus; true if a session had it
    pub fn exit_interactive(&mut self) -> bool {
        let Some(passthrough) = self.drop_interactive() else {
            return false;
        };
        let name = passthrough.session();
        if let Some(session) = self.sessions.get_mut(name) {
            session.visibility = passthrough.state().return_visibility;
        }
        info!(session = %name, "Left interactive mode");
        self.rearm(name);
        true
    }

    /// Clear interactive state; the send worker drains what is queued, then stops
    fn drop_interactive(&mut self) -> Option<Passthrough> {
        self.send_queue = None;
        self.interactive.take()
    }

    /// Route one input event to the focused session
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> InteractiveOutcome {
        let Some(passthrough) = self.interactive.as_mut() else {
            return InteractiveOutcome::Inactive;
        };
        let action = passthrough.handle(event, now);
        self.perform(action)
    }

    fn perform(&mut self, action: PassthroughAction) -> InteractiveOutcome {
        let Some((session, target)) = self
            .interactive
            .as_ref()
            .map(|p| (p.session().to_string(), p.target().to_string()))
        else {
            return InteractiveOutcome::Inactive;
        };

        match action {
            PassthroughAction::Send { inputs, snap_back } => {
                let generation = self.sessions.get(&session).map_or(0, |s| s.generation());
                let queued = self
                    .send_queue
                    .as_ref()
                    .is_some_and(|queue| queue.send(SendUnit { generation, inputs }).is_ok());
                if !queued {
                    warn!(session = %session, target = %target, "Send worker gone, input lost");
                }
                InteractiveOutcome::Forwarded { snap_back }
            }
            PassthroughAction::ArmEscapeTimer { token, delay } => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(RuntimeMessage::EscapeTimeout { session, token });
                });
                InteractiveOutcome::Pending
            }
            PassthroughAction::Exit => {
                self.exit_interactive();
                InteractiveOutcome::Exited
            }
            PassthroughAction::Scroll {
                offset,
                refresh_after,
            } => {
                self.rearm_after(&session, Some(refresh_after));
                InteractiveOutcome::Scrolled { offset }
            }
            PassthroughAction::Dropped(reason) => {
                debug!(session = %session, reason, "Dropped input");
                InteractiveOutcome::Dropped(reason)
            }
        }
    }

    /// One task per interactive session sends every unit in arrival order
    fn spawn_send_worker(&self, session: String, target: String) -> UnboundedSender<SendUnit> {
        let (queue, mut units) = mpsc::unbounded_channel::<SendUnit>();
        let mux = self.mux.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(SendUnit { generation, inputs }) = units.recv().await {
                for input in inputs {
                    let (result, is_paste) = match &input {
                        Outgoing::Key(key) => (mux.send_key(&target, key).await, false),
                        Outgoing::Literal(text) => (mux.send_literal(&target, text).await, false),
                        Outgoing::Paste(text) => (mux.paste(&target, text).await, true),
                    };
                    match result {
                        Err(e) if e.is_not_found() => {
                            let _ = tx.send(RuntimeMessage::SessionDead {
                                session,
                                generation,
                            });
                            return;
                        }
                        result if is_paste => {
                            let _ = tx.send(RuntimeMessage::PasteResult {
                                session: session.clone(),
                                result,
                            });
                        }
                        Err(e) => debug!(session = %session, error = %e, "Send failed"),
                        Ok(()) => {}
                    }
                }
            }
            debug!(session = %session, "Send worker stopped");
        });
        queue
    }
}

/// Everything one poll needs, detached from the supervisor
struct PollJob {
    session: String,
    generation: u64,
    /// Set for the interactive session
    target: Option<String>,
    previous_digest: Option<u64>,
    previous_status: Status,
    working_dir: Option<PathBuf>,
}

impl PollJob {
    async fn run(self, capture: &CaptureService, detector: &StatusDetector) -> RuntimeMessage {
        let result = match &self.target {
            Some(target) => capture
                .capture_interactive(&self.session, target)
                .await
                .map(|c| (c.text, Some(c.cursor))),
            None => capture.capture_one(&self.session).await.map(|t| (t, None)),
        };

        let (text, cursor) = match result {
            Ok(captured) => captured,
            Err(e) if e.is_not_found() => {
                return if self.target.is_some() {
                    RuntimeMessage::SessionDead {
                        session: self.session,
                        generation: self.generation,
                    }
                } else {
                    RuntimeMessage::SessionStopped {
                        session: self.session,
                        generation: self.generation,
                    }
                };
            }
            Err(error) => {
                return RuntimeMessage::CaptureFailed {
                    session: self.session,
                    generation: self.generation,
                    error,
                };
            }
        };

        let digest = stable_hash(&text);
        let changed = self.previous_digest != Some(digest);
        let status = detector.evaluate(
            &text,
            changed,
            &self.previous_status,
            self.working_dir.as_deref(),
        );

        if changed {
            RuntimeMessage::OutputChanged {
                session: self.session,
                generation: self.generation,
                text,
                digest,
                status,
                cursor,
            }
        } else {
            RuntimeMessage::OutputUnchanged {
                session: self.session,
                generation: self.generation,
                status,
                cursor,
            }
        }
    }
}

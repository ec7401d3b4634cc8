//! Passthrough state machine - decides what each input event sends to the pane
//!
//! Pure: every decision is returned as a [`PassthroughAction`]; the supervisor
//! performs the sends and arms the timers.

use std::time::{Duration, Instant};
use tracing::debug;

use super::filter::{is_mouse_fragment, is_simple_text};
use super::keys::{is_navigation, key_to_tmux, InputEvent, MouseInput, TmuxInput};
use super::state::InteractiveState;
use crate::config::InteractiveConfig;

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

/// One send to the pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Key(String),
    Literal(String),
    /// Delivered through the paste buffer
    Paste(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassthroughAction {
    /// Send these in order from one task
    Send {
        inputs: Vec<Outgoing>,
        /// Return a scrolled-away view to live output
        snap_back: bool,
    },
    /// Start the single pending-Escape timer
    ArmEscapeTimer { token: u64, delay: Duration },
    /// Leave interactive mode
    Exit,
    /// Scroll the local view; refresh after `refresh_after`
    Scroll { offset: u32, refresh_after: Duration },
    Dropped(&'static str),
}

pub struct Passthrough {
    state: InteractiveState,
    config: InteractiveConfig,
}

impl Passthrough {
    pub fn new(state: InteractiveState, config: InteractiveConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &InteractiveState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InteractiveState {
        &mut self.state
    }

    pub fn session(&self) -> &str {
        &self.state.session
    }

    pub fn target(&self) -> &str {
        &self.state.target
    }

    fn suppressed(&self, now: Instant) -> bool {
        self.state.scroll.suppresses(
            now,
            self.config.scroll_burst_threshold,
            self.config.scroll_suppress(),
        )
    }

    pub fn handle(&mut self, event: InputEvent, now: Instant) -> PassthroughAction {
        if event.is_escape() {
            return self.handle_escape(now);
        }
        match event {
            InputEvent::Mouse(mouse) => self.handle_mouse(mouse, now),
            other => self.forward(other, now),
        }
    }

    /// The pending-Escape timer fired; stale tokens are ignored
    pub fn on_escape_timeout(&mut self, token: u64) -> Option<PassthroughAction> {
        if !self.state.escape_pending || self.state.escape_timer != Some(token) {
            return None;
        }
        self.state.clear_escape();
        Some(PassthroughAction::Send {
            inputs: vec![Outgoing::Key("Escape".to_string())],
            snap_back: false,
        })
    }

    fn handle_escape(&mut self, now: Instant) -> PassthroughAction {
        if self.state.escape_pending {
            self.state.clear_escape();
            return PassthroughAction::Exit;
        }
        if self.suppressed(now) {
            return PassthroughAction::Dropped("escape during scroll burst");
        }
        let token = self.state.set_escape_pending(now);
        PassthroughAction::ArmEscapeTimer {
            token,
            delay: self.config.escape_window(),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseInput, now: Instant) -> PassthroughAction {
        self.state.last_mouse_at = Some(now);

        let lines = u32::from(self.config.scroll_lines);
        let offset = match mouse {
            MouseInput::ScrollUp => self.state.scroll_offset.saturating_add(lines),
            MouseInput::ScrollDown => self.state.scroll_offset.saturating_sub(lines),
            MouseInput::Other => return PassthroughAction::Dropped("mouse button"),
        };

        let chained = self
            .state
            .scroll
            .record(now, self.config.scroll_burst_timeout());
        self.state.scroll_offset = offset;

        let refresh_after = if chained >= self.config.scroll_burst_threshold {
            self.config.scroll_burst_debounce()
        } else {
            self.config.scroll_debounce()
        };
        PassthroughAction::Scroll {
            offset,
            refresh_after,
        }
    }

    fn forward(&mut self, event: InputEvent, now: Instant) -> PassthroughAction {
        if let InputEvent::Text(text) = &event {
            if text == "[" {
                if self.state.escape_within(now, self.config.escape_bracket_window()) {
                    // the pending Escape was the head of a split sequence
                    self.state.clear_escape();
                    return PassthroughAction::Dropped("split escape sequence");
                }
                if self.state.mouse_within(now, self.config.mouse_bracket_window()) {
                    return PassthroughAction::Dropped("split mouse sequence");
                }
            }
            if is_mouse_fragment(text) {
                return PassthroughAction::Dropped("mouse fragment");
            }
        }

        let suppressed = self.suppressed(now);
        let outgoing = match &event {
            InputEvent::Text(text) if suppressed && !is_simple_text(text) => {
                return PassthroughAction::Dropped("input during scroll burst");
            }
            InputEvent::Text(text) if self.is_paste(text) => Outgoing::Paste(self.wrap_paste(text)),
            InputEvent::Text(text) => Outgoing::Literal(text.clone()),
            InputEvent::Paste(text) => Outgoing::Paste(self.wrap_paste(text)),
            InputEvent::Key(key) => match key_to_tmux(key) {
                Some(TmuxInput::Key(name)) => Outgoing::Key(name),
                Some(TmuxInput::Literal(text)) => Outgoing::Literal(text),
                None => return PassthroughAction::Dropped("unmapped key"),
            },
            InputEvent::Mouse(_) => return PassthroughAction::Dropped("mouse"),
        };

        let mut inputs = Vec::with_capacity(2);
        if self.state.escape_pending {
            self.state.clear_escape();
            inputs.push(Outgoing::Key("Escape".to_string()));
        }
        inputs.push(outgoing);

        let snap_back = self.state.scroll_offset > 0 && !suppressed && is_genuine(&event);
        if snap_back {
            self.state.scroll_offset = 0;
        }
        self.state.last_key_at = Some(now);

        debug!(session = %self.state.session, sends = inputs.len(), snap_back, "Forwarding input");
        PassthroughAction::Send { inputs, snap_back }
    }

    fn is_paste(&self, text: &str) -> bool {
        text.contains('\n') || text.chars().count() > self.config.paste_length_threshold
    }

    fn wrap_paste(&self, text: &str) -> String {
        if self.state.bracketed_paste {
            format!("{}{}{}", PASTE_START, text, PASTE_END)
        } else {
            text.to_string()
        }
    }
}

/// Typed by a person: one printable char or a navigation key
fn is_genuine(event: &InputEvent) -> bool {
    match event {
        InputEvent::Text(text) => {
            let mut chars = text.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
        }
        InputEvent::Key(key) => is_navigation(key),
        _ => false,
    }
}

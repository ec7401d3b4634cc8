//! Interactive state - exists only while a session has input focus

use std::time::{Duration, Instant};

use crate::infra::mux::CursorState;
use crate::poll::Visibility;

const BRACKETED_PASTE_ON: &str = "\x1b[?2004h";
const BRACKETED_PASTE_OFF: &str = "\x1b[?2004l";
const MOUSE_MODES: &[&str] = &["1000", "1002", "1003", "1006"];

/// Chained scroll events
#[derive(Debug, Clone, Default)]
pub struct ScrollBurst {
    pub count: u32,
    pub started_at: Option<Instant>,
    pub last_at: Option<Instant>,
}

impl ScrollBurst {
    /// Record one scroll event; returns the chain length including it
    pub fn record(&mut self, now: Instant, timeout: Duration) -> u32 {
        let chained = self
            .last_at
            .is_some_and(|last| now.saturating_duration_since(last) < timeout);
        if chained {
            self.count += 1;
        } else {
            self.count = 1;
            self.started_at = Some(now);
        }
        self.last_at = Some(now);
        self.count
    }

    /// Inside a burst, or within `window` after its last event
    pub fn suppresses(&self, now: Instant, threshold: u32, window: Duration) -> bool {
        self.count >= threshold
            && self
                .last_at
                .is_some_and(|last| now.saturating_duration_since(last) < window)
    }
}

#[derive(Debug, Clone)]
pub struct InteractiveState {
    pub session: String,
    /// Pane id when known, otherwise the session name
    pub target: String,
    pub prefix_key: Option<String>,
    pub escape_pending: bool,
    pub escape_set_at: Option<Instant>,
    /// Token of the one armed escape timer
    pub escape_timer: Option<u64>,
    next_token: u64,
    pub last_key_at: Option<Instant>,
    pub cursor: Option<CursorState>,
    pub bracketed_paste: bool,
    pub mouse_reporting: bool,
    pub last_mouse_at: Option<Instant>,
    pub scroll: ScrollBurst,
    /// Lines scrolled back from live output
    pub scroll_offset: u32,
    /// Visibility the session had before it took focus
    pub return_visibility: Visibility,
}

impl InteractiveState {
    pub fn new(session: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            target: target.into(),
            prefix_key: None,
            escape_pending: false,
            escape_set_at: None,
            escape_timer: None,
            next_token: 0,
            last_key_at: None,
            cursor: None,
            bracketed_paste: false,
            mouse_reporting: false,
            last_mouse_at: None,
            scroll: ScrollBurst::default(),
            scroll_offset: 0,
            return_visibility: Visibility::default(),
        }
    }

    /// Mark an Escape pending and arm a fresh timer token
    pub fn set_escape_pending(&mut self, now: Instant) -> u64 {
        self.next_token += 1;
        self.escape_pending = true;
        self.escape_set_at = Some(now);
        self.escape_timer = Some(self.next_token);
        self.next_token
    }

    pub fn clear_escape(&mut self) {
        self.escape_pending = false;
        self.escape_set_at = None;
        self.escape_timer = None;
    }

    /// Escape pending and set within `window`
    pub fn escape_within(&self, now: Instant, window: Duration) -> bool {
        self.escape_pending
            && self
                .escape_set_at
                .is_some_and(|at| now.saturating_duration_since(at) < window)
    }

    pub fn mouse_within(&self, now: Instant, window: Duration) -> bool {
        self.last_mouse_at
            .is_some_and(|at| now.saturating_duration_since(at) < window)
    }

    pub fn update_cursor(&mut self, cursor: CursorState) {
        self.cursor = Some(cursor);
    }

    /// Track terminal modes from their toggle sequences; the last toggle wins
    pub fn update_modes(&mut self, text: &str) {
        if let Some(on) = last_toggle(text, &[BRACKETED_PASTE_ON], &[BRACKETED_PASTE_OFF]) {
            self.bracketed_paste = on;
        }

        let mouse_on: Vec<String> = MOUSE_MODES.iter().map(|m| format!("\x1b[?{}h", m)).collect();
        let mouse_off: Vec<String> = MOUSE_MODES.iter().map(|m| format!("\x1b[?{}l", m)).collect();
        let on: Vec<&str> = mouse_on.iter().map(String::as_str).collect();
        let off: Vec<&str> = mouse_off.iter().map(String::as_str).collect();
        if let Some(on) = last_toggle(text, &on, &off) {
            self.mouse_reporting = on;
        }
    }

    /// Cursor position inside a `view_width` x `view_height` view of the pane
    ///
    /// The view shows the bottom of the pane. Positions outside it are clamped to
    /// the nearest edge, since pane size can lag behind a resize.
    pub fn render_cursor(&self, view_width: u16, view_height: u16) -> Option<(u16, u16)> {
        let cursor = self.cursor?;
        if !cursor.visible || view_width == 0 || view_height == 0 || self.scroll_offset > 0 {
            return None;
        }

        let hidden_rows = cursor.pane_height.saturating_sub(view_height);
        let row = cursor.row.saturating_sub(hidden_rows).min(view_height - 1);
        let col = cursor.col.min(view_width - 1);
        Some((row, col))
    }
}

/// Latest of the `on`/`off` sequences in `text`: `Some(true)` when an `on` came last
fn last_toggle(text: &str, on: &[&str], off: &[&str]) -> Option<bool> {
    let last = |needles: &[&str]| needles.iter().filter_map(|n| text.rfind(n)).max();
    match (last(on), last(off)) {
        (Some(a), Some(b)) => Some(a > b),
        (Some(_), None) => Some(true),
        (None, Some(_)) => Some(false),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(row: u16, col: u16, visible: bool, width: u16, height: u16) -> CursorState {
        CursorState {
            row,
            col,
            visible,
            pane_width: width,
            pane_height: height,
        }
    }

    #[test]
    fn test_bracketed_paste_last_toggle_wins() {
        let mut state = InteractiveState::new("cam-1", "%1");
        state.update_modes("\x1b[?2004h prompt");
        assert!(state.bracketed_paste);

        state.update_modes("\x1b[?2004h ... \x1b[?2004l");
        assert!(!state.bracketed_paste);

        // no toggle in this capture: keep the previous mode
        state.bracketed_paste = true;
        state.update_modes("plain text");
        assert!(state.bracketed_paste);
    }

    #[test]
    fn test_mouse_reporting_modes() {
        let mut state = InteractiveState::new("cam-1", "%1");
        state.update_modes("\x1b[?1000h\x1b[?1006h");
        assert!(state.mouse_reporting);
        state.update_modes("\x1b[?1006h\x1b[?1002l");
        assert!(!state.mouse_reporting);
    }

    #[test]
    fn test_render_cursor_clamps_into_view() {
        let mut state = InteractiveState::new("cam-1", "%1");
        assert_eq!(state.render_cursor(80, 24), None);

        state.update_cursor(cursor(5, 10, true, 80, 24));
        assert_eq!(state.render_cursor(80, 24), Some((5, 10)));

        // pane taller than the view: rows are counted from the bottom
        state.update_cursor(cursor(40, 10, true, 80, 50));
        assert_eq!(state.render_cursor(80, 24), Some((14, 10)));

        // stale size data must not push the cursor out of view
        state.update_cursor(cursor(30, 120, true, 80, 24));
        assert_eq!(state.render_cursor(80, 24), Some((23, 79)));

        state.update_cursor(cursor(1, 1, false, 80, 24));
        assert_eq!(state.render_cursor(80, 24), None);
    }

    #[test]
    fn test_escape_tokens_are_fresh() {
        let mut state = InteractiveState::new("cam-1", "%1");
        let now = Instant::now();
        let first = state.set_escape_pending(now);
        state.clear_escape();
        let second = state.set_escape_pending(now);

        assert_ne!(first, second);
        assert_eq!(state.escape_timer, Some(second));
        assert!(state.escape_within(now + Duration::from_millis(4), Duration::from_millis(5)));
        assert!(!state.escape_within(now + Duration::from_millis(5), Duration::from_millis(5)));
    }

    #[test]
    fn test_scroll_burst_chains_and_suppresses() {
        let mut burst = ScrollBurst::default();
        let timeout = Duration::from_millis(150);
        let t0 = Instant::now();

        assert_eq!(burst.record(t0, timeout), 1);
        assert_eq!(burst.record(t0 + Duration::from_millis(100), timeout), 2);
        assert_eq!(burst.record(t0 + Duration::from_millis(200), timeout), 3);
        assert!(burst.suppresses(t0 + Duration::from_millis(600), 3, Duration::from_millis(500)));
        assert!(!burst.suppresses(t0 + Duration::from_millis(700), 3, Duration::from_millis(500)));

        // gap longer than the timeout starts a new chain
        assert_eq!(burst.record(t0 + Duration::from_secs(2), timeout), 1);
    }
}

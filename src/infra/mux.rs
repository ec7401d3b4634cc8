//! Multiplexer contract - what the runtime consumes from tmux

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::MuxResult;

/// How much and what kind of text a capture returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Trailing scrollback lines
    pub history_lines: u32,
    /// Rejoin soft-wrapped lines
    pub join_wrapped: bool,
    /// Keep escape sequences in the text
    pub escape_sequences: bool,
}

/// Cursor position and pane geometry, read in the same invocation as a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
    pub pane_width: u16,
    pub pane_height: u16,
}

/// Captured text plus the cursor state at capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorCapture {
    pub text: String,
    pub cursor: CursorState,
}

/// Terminal multiplexer operations
///
/// `TmuxClient` is the production implementation; tests plug in an in-memory fake.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Capture one session/pane
    async fn capture(&self, target: &str, options: CaptureOptions) -> MuxResult<String>;

    /// Capture one session/pane together with its cursor and pane size
    async fn capture_with_cursor(
        &self,
        target: &str,
        options: CaptureOptions,
    ) -> MuxResult<CursorCapture>;

    /// Capture several sessions in a single invocation
    async fn capture_batch(
        &self,
        sessions: &[String],
        options: CaptureOptions,
    ) -> MuxResult<HashMap<String, String>>;

    /// Send a symbolic key (`Enter`, `C-c`, `Up`, ...)
    async fn send_key(&self, target: &str, key: &str) -> MuxResult<()>;

    /// Send text literally
    async fn send_literal(&self, target: &str, text: &str) -> MuxResult<()>;

    /// Deliver text through the paste buffer
    async fn paste(&self, target: &str, text: &str) -> MuxResult<()>;

    /// Pane id (`%3`) of the session's active pane
    async fn pane_id(&self, session: &str) -> MuxResult<String>;

    /// The multiplexer's prefix key (`C-b`)
    async fn prefix_key(&self) -> MuxResult<String>;

    async fn has_session(&self, session: &str) -> bool;

    async fn list_sessions(&self) -> MuxResult<Vec<String>>;

    async fn new_session(&self, session: &str, working_dir: &Path, command: &str) -> MuxResult<()>;

    async fn kill_session(&self, session: &str) -> MuxResult<()>;
}

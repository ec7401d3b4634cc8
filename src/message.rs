//! Runtime messages - results reported back to the host loop

use crate::error::MuxError;
use crate::infra::mux::CursorState;
use crate::status::Status;

/// Everything spawned work reports back to [`crate::Supervisor::handle`]
#[derive(Debug)]
pub enum RuntimeMessage {
    /// A poll timer fired; dropped when `generation` is stale
    PollDue { session: String, generation: u64 },
    /// Capture produced new text
    OutputChanged {
        session: String,
        generation: u64,
        text: String,
        digest: u64,
        status: Status,
        cursor: Option<CursorState>,
    },
    /// Capture matched the previous text; status and cursor may still have moved
    OutputUnchanged {
        session: String,
        generation: u64,
        status: Status,
        cursor: Option<CursorState>,
    },
    /// Transient capture failure; the session is polled again at its next interval
    CaptureFailed {
        session: String,
        generation: u64,
        error: MuxError,
    },
    /// The session is gone and has been purged; dropped when `generation` is stale
    SessionStopped { session: String, generation: u64 },
    /// The interactive session died; interactive mode has ended
    SessionDead { session: String, generation: u64 },
    /// Outcome of a paste sent in interactive mode
    PasteResult {
        session: String,
        result: Result<(), MuxError>,
    },
    /// The pending-Escape timer fired
    EscapeTimeout { session: String, token: u64 },
}

impl RuntimeMessage {
    pub fn session(&self) -> &str {
        match self {
            RuntimeMessage::PollDue { session, .. }
            | RuntimeMessage::OutputChanged { session, .. }
            | RuntimeMessage::OutputUnchanged { session, .. }
            | RuntimeMessage::CaptureFailed { session, .. }
            | RuntimeMessage::SessionStopped { session, .. }
            | RuntimeMessage::SessionDead { session, .. }
            | RuntimeMessage::PasteResult { session, .. }
            | RuntimeMessage::EscapeTimeout { session, .. } => session,
        }
    }
}

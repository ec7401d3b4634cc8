//! Pane Watch - 捕获、缓存、轮询并驱动 tmux 中的 AI 代理会话

pub mod capture;
pub mod config;
pub mod error;
pub mod infra;
pub mod interactive;
pub mod message;
pub mod poll;
pub mod session;
pub mod status;
pub mod supervisor;

pub use capture::{ActiveRegistry, BatchCoordinator, BatchOutcome, CaptureCache, CaptureService};
pub use config::RuntimeConfig;
pub use error::{MuxError, MuxResult};
pub use infra::{CaptureOptions, CursorCapture, CursorState, Multiplexer, TmuxClient};
pub use interactive::{InputEvent, MouseInput, Outgoing, Passthrough, PassthroughAction};
pub use message::RuntimeMessage;
pub use poll::{PollScheduler, RunawayGuard, Visibility};
pub use session::{OutputBuffer, Session, SessionSpec};
pub use status::{
    AgentMarker, FileMarkerStore, MarkerSource, MarkerState, NoMarkers, Status, StatusDetector,
};
pub use supervisor::{InteractiveOutcome, Supervisor, ValidationReport};

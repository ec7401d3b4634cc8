//! 基础设施层 - 终端复用器接口、tmux 客户端、终端文本工具

pub mod mux;
pub mod terminal;
pub mod tmux;

pub use mux::{CaptureOptions, CursorCapture, CursorState, Multiplexer};
pub use tmux::TmuxClient;

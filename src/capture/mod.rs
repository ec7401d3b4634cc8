//! 捕获层 - 共享缓存、活跃会话登记和批量协调

pub mod batch;
pub mod cache;
pub mod registry;
pub mod service;

pub use batch::{BatchCoordinator, BatchOutcome};
pub use cache::CaptureCache;
pub use registry::ActiveRegistry;
pub use service::CaptureService;

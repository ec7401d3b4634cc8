//! 轮询模块 - 会话级间隔、定时器和失控限流

pub mod runaway;
pub mod scheduler;

pub use runaway::RunawayGuard;
pub use scheduler::{PollScheduler, Visibility};

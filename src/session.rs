//! 会话模块 - supervisor 对单个 tmux 会话的全部记录

use std::path::{Path, PathBuf};

use crate::config::RuntimeConfig;
use crate::infra::terminal::trim_to_byte_budget;
use crate::poll::{RunawayGuard, Visibility};
use crate::status::Status;

/// 最近一次捕获的输出，按字节限长
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    max_bytes: usize,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            text: String::new(),
            max_bytes,
        }
    }

    /// Replace the content; oldest lines are dropped past the byte cap
    pub fn replace(&mut self, text: String) {
        self.text = if text.len() <= self.max_bytes {
            text
        } else {
            trim_to_byte_budget(&text, self.max_bytes).to_string()
        };
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// 开始跟踪会话所需的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: String,
    pub working_dir: Option<PathBuf>,
}

impl SessionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub pane_id: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputBuffer,
    pub status: Status,
    pub runaway: RunawayGuard,
    pub visibility: Visibility,
    /// Its tmux session vanished; kept only until the host cleans it up
    pub orphaned: bool,
    pub last_digest: Option<u64>,
    generation: u64,
}

impl Session {
    pub fn new(spec: SessionSpec, config: &RuntimeConfig) -> Self {
        Self {
            name: spec.name,
            pane_id: None,
            working_dir: spec.working_dir,
            output: OutputBuffer::new(config.capture.max_bytes),
            status: Status::default(),
            runaway: RunawayGuard::new(&config.runaway),
            visibility: Visibility::default(),
            orphaned: false,
            last_digest: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 使此前调度的所有定时器失效
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// 带 `generation` 标记的定时器或捕获是否仍然有效
    pub fn accepts(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Forget captured state after an identity change (reconnect, new pane)
    pub fn reset_output(&mut self) {
        self.output.clear();
        self.last_digest = None;
        self.runaway.reset();
    }
}

//! Runtime configuration - cache windows, poll intervals and input heuristics
//!
//! Loaded from `~/.config/pane-watch/config.json`. Every field has a default, so a
//! missing file (or a file that sets only a few keys) is fine.
//!
//! The interactive timing windows (5ms / 10ms / 500ms) were tuned against real
//! leaked-escape traffic. Change them only with a reproduction in hand.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// 运行时配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub capture: CaptureConfig,
    pub status: StatusConfig,
    pub poll: PollConfig,
    pub runaway: RunawayConfig,
    pub interactive: InteractiveConfig,
    pub tmux: TmuxConfig,
}

impl RuntimeConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("pane-watch")
            .join("config.json")
    }

    /// 从默认路径加载
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// 从指定文件加载，文件不存在时使用默认值
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// 捕获缓存和活跃会话登记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a captured snapshot may be served from cache
    pub ttl_ms: u64,
    /// Periodic sweep of expired entries
    pub sweep_interval_ms: u64,
    /// A session counts as active while polled within this window
    pub active_window_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 300,
            sweep_interval_ms: 10_000,
            active_window_ms: 30_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        ms(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        ms(self.sweep_interval_ms)
    }

    pub fn active_window(&self) -> Duration {
        ms(self.active_window_ms)
    }
}

/// 捕获调用限制
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Hard bound on one capture invocation
    pub timeout_ms: u64,
    /// Captured text is trimmed from the front to this many bytes
    pub max_bytes: usize,
    /// Trailing scrollback lines requested from tmux
    pub history_lines: u32,
    /// Below this many active sessions a batch is not worth it
    pub min_batch_peers: usize,
    /// Rejoin wrapped lines (`capture-pane -J`)
    pub join_wrapped: bool,
    /// Keep escape sequences in background captures
    pub escape_sequences: bool,
    /// Keep escape sequences in interactive captures (mode detection needs them)
    pub interactive_escape_sequences: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            max_bytes: 256 * 1024,
            history_lines: 2_000,
            min_batch_peers: 2,
            join_wrapped: true,
            escape_sequences: false,
            interactive_escape_sequences: true,
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        ms(self.timeout_ms)
    }
}

/// 状态检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Only this many trailing bytes are scanned for patterns
    pub tail_bytes: usize,
    /// Waiting prompts must appear within this many trailing non-empty lines
    pub waiting_tail_lines: usize,
    /// Markers older than this are ignored
    pub marker_max_age_secs: u64,
    /// Override for the marker directory
    pub marker_dir: Option<PathBuf>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            tail_bytes: 4 * 1024,
            waiting_tail_lines: 5,
            marker_max_age_secs: 600,
            marker_dir: None,
        }
    }
}

impl StatusConfig {
    pub fn marker_max_age(&self) -> Duration {
        Duration::from_secs(self.marker_max_age_secs)
    }
}

/// 按可见性和状态划分的轮询间隔
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub hidden_ms: u64,
    pub visible_busy_ms: u64,
    pub visible_idle_ms: u64,
    pub focused_busy_ms: u64,
    pub focused_idle_ms: u64,
    /// Interactive cadence right after a key press
    pub interactive_ms: u64,
    /// Interactive cadence once typing has stopped
    pub interactive_idle_ms: u64,
    /// No key for this long switches to the idle interactive cadence
    pub interactive_decay_ms: u64,
    /// Floor applied to runaway (throttled) sessions
    pub throttled_ms: u64,
    /// Upper bound of the per-session stagger
    pub stagger_max_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            hidden_ms: 5_000,
            visible_busy_ms: 1_000,
            visible_idle_ms: 2_000,
            focused_busy_ms: 250,
            focused_idle_ms: 1_000,
            interactive_ms: 50,
            interactive_idle_ms: 250,
            interactive_decay_ms: 1_000,
            throttled_ms: 3_000,
            stagger_max_ms: 120,
        }
    }
}

/// Runaway output detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunawayConfig {
    /// This many content changes ...
    pub max_polls: usize,
    /// ... within this window throttle the session
    pub window_ms: u64,
    /// Consecutive unchanged polls needed to release the throttle
    pub settle_polls: u32,
}

impl Default for RunawayConfig {
    fn default() -> Self {
        Self {
            max_polls: 20,
            window_ms: 3_000,
            settle_polls: 5,
        }
    }
}

impl RunawayConfig {
    pub fn window(&self) -> Duration {
        ms(self.window_ms)
    }
}

/// Interactive passthrough heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveConfig {
    /// Second Escape within this window exits interactive mode
    pub escape_window_ms: u64,
    /// A bare `[` this soon after Escape is a split escape sequence
    pub escape_bracket_window_ms: u64,
    /// A bare `[` this soon after a mouse event is a split mouse sequence
    pub mouse_bracket_window_ms: u64,
    /// Scroll events closer than this chain into a burst
    pub scroll_burst_timeout_ms: u64,
    /// Chained scroll events needed to count as a burst
    pub scroll_burst_threshold: u32,
    /// Refresh delay after a single scroll
    pub scroll_debounce_ms: u64,
    /// Refresh delay while bursting
    pub scroll_burst_debounce_ms: u64,
    /// Non-simple input is dropped this long after a burst
    pub scroll_suppress_ms: u64,
    /// Scroll step in lines
    pub scroll_lines: u16,
    /// Text longer than this (in chars) is sent as a paste
    pub paste_length_threshold: usize,
}

impl Default for InteractiveConfig {
    fn default() -> Self {
        Self {
            escape_window_ms: 300,
            escape_bracket_window_ms: 5,
            mouse_bracket_window_ms: 10,
            scroll_burst_timeout_ms: 150,
            scroll_burst_threshold: 3,
            scroll_debounce_ms: 40,
            scroll_burst_debounce_ms: 10,
            scroll_suppress_ms: 500,
            scroll_lines: 3,
            paste_length_threshold: 16,
        }
    }
}

impl InteractiveConfig {
    pub fn escape_window(&self) -> Duration {
        ms(self.escape_window_ms)
    }

    pub fn escape_bracket_window(&self) -> Duration {
        ms(self.escape_bracket_window_ms)
    }

    pub fn mouse_bracket_window(&self) -> Duration {
        ms(self.mouse_bracket_window_ms)
    }

    pub fn scroll_burst_timeout(&self) -> Duration {
        ms(self.scroll_burst_timeout_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        ms(self.scroll_debounce_ms)
    }

    pub fn scroll_burst_debounce(&self) -> Duration {
        ms(self.scroll_burst_debounce_ms)
    }

    pub fn scroll_suppress(&self) -> Duration {
        ms(self.scroll_suppress_ms)
    }
}

/// tmux invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxConfig {
    /// Explicit tmux binary; otherwise resolved from PATH
    pub binary: Option<PathBuf>,
    /// Private server socket name (`tmux -L`)
    pub socket: Option<String>,
    /// Only sessions with this prefix are adopted at startup
    pub session_prefix: Option<String>,
}

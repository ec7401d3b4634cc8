//! 复用器错误 - 捕获和发送操作的类型化结果

use std::time::Duration;
use thiserror::Error;

/// 目标会话/窗格不存在时 tmux 输出的 stderr 片段
const NOT_FOUND_MARKERS: &[&str] = &[
    "can't find session",
    "can't find pane",
    "can't find window",
    "no such session",
    "session not found",
    "no server running",
];

/// 复用器调用返回的错误
#[derive(Debug, Error)]
pub enum MuxError {
    /// 调用超时（可重试）
    #[error("tmux {op} timed out after {}ms", .after.as_millis())]
    Timeout { op: &'static str, after: Duration },
    /// 目标会话或窗格已消失（该会话终止）
    #[error("tmux target not found: {target}")]
    NotFound { target: String },
    /// tmux 因其他原因非零退出
    #[error("tmux {op} failed: {stderr}")]
    CommandFailed { op: &'static str, stderr: String },
    /// 输出无法解析（例如批量响应缺少某段）
    #[error("malformed tmux response: {0}")]
    Malformed(String),
    /// 无法启动 tmux
    #[error("failed to run tmux: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type MuxResult<T> = Result<T, MuxError>;

impl MuxError {
    /// 根据 stderr 对失败调用分类
    pub fn from_stderr(op: &'static str, target: &str, stderr: &str) -> Self {
        if stderr_indicates_missing_target(stderr) {
            MuxError::NotFound {
                target: target.to_string(),
            }
        } else {
            MuxError::CommandFailed {
                op,
                stderr: stderr.trim().to_string(),
            }
        }
    }

    /// 会话已结束：调用方需清理并停止轮询
    pub fn is_not_found(&self) -> bool {
        matches!(self, MuxError::NotFound { .. })
    }

    /// 临时失败：下次轮询时重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MuxError::Timeout { .. } | MuxError::CommandFailed { .. } | MuxError::Spawn(_)
        )
    }
}

fn stderr_indicates_missing_target(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_session_is_not_found() {
        let err = MuxError::from_stderr("capture-pane", "cam-1", "can't find session: cam-1\n");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_pane_is_not_found() {
        let err = MuxError::from_stderr("send-keys", "%12", "can't find pane: %12");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_failure_is_retryable() {
        let err = MuxError::from_stderr("capture-pane", "cam-1", "  server busy  ");
        assert!(!err.is_not_found());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "tmux capture-pane failed: server busy");
    }

    #[test]
    fn test_timeout_display() {
        let err = MuxError::Timeout {
            op: "capture-pane",
            after: Duration::from_millis(2000),
        };
        assert_eq!(err.to_string(), "tmux capture-pane timed out after 2000ms");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_malformed_is_not_retryable_as_is() {
        let err = MuxError::Malformed("missing section".into());
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());
    }
}

//! tmux 客户端 - 实现 `Multiplexer` 的子进程调用

use async_trait::async_trait;
use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hasher};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::error::{MuxError, MuxResult};
use crate::infra::mux::{CaptureOptions, CursorCapture, CursorState, Multiplexer};

/// Cursor and geometry line printed ahead of an interactive capture
const CURSOR_FORMAT: &str = "#{cursor_x},#{cursor_y},#{cursor_flag},#{pane_width},#{pane_height}";

/// Prefix of the per-session delimiter line in a batch capture
const BATCH_DELIMITER_PREFIX: &str = "==PANE-WATCH";

/// tmux 客户端
pub struct TmuxClient {
    binary: PathBuf,
    socket: Option<String>,
    capture_timeout: Duration,
    buffer_name: String,
}

impl TmuxClient {
    pub fn new(config: &RuntimeConfig) -> Self {
        let binary = config
            .tmux
            .binary
            .clone()
            .or_else(|| which::which("tmux").ok())
            .unwrap_or_else(|| PathBuf::from("tmux"));

        Self {
            binary,
            socket: config.tmux.socket.clone(),
            capture_timeout: config.capture.timeout(),
            buffer_name: format!("pane-watch-{}", std::process::id()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            cmd.args(["-L", socket.as_str()]);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// 带捕获超时执行，超时后杀掉子进程
    async fn run_timed(&self, op: &'static str, target: &str, args: &[String]) -> MuxResult<String> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = match tokio::time::timeout(self.capture_timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MuxError::Timeout {
                    op,
                    after: self.capture_timeout,
                })
            }
        };
        check_output(op, target, output)
    }

    /// 不限时执行（发送按键通常很快）
    async fn run(&self, op: &'static str, target: &str, args: &[String]) -> MuxResult<String> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = cmd.output().await?;
        check_output(op, target, output)
    }

    async fn load_buffer(&self, target: &str, text: &str) -> MuxResult<()> {
        let mut child = self
            .command()
            .args(["load-buffer", "-b", self.buffer_name.as_str(), "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        check_output("load-buffer", target, output).map(|_| ())
    }
}

fn check_output(op: &'static str, target: &str, output: Output) -> MuxResult<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(MuxError::from_stderr(op, target, &stderr))
    }
}

fn capture_args(target: &str, options: CaptureOptions) -> Vec<String> {
    let mut args = vec![
        "capture-pane".to_string(),
        "-p".to_string(),
        "-t".to_string(),
        target.to_string(),
        "-S".to_string(),
        format!("-{}", options.history_lines),
    ];
    if options.join_wrapped {
        args.push("-J".to_string());
    }
    if options.escape_sequences {
        args.push("-e".to_string());
    }
    args
}

/// tmux expands `#` in display-message formats
fn escape_format(text: &str) -> String {
    text.replace('#', "##")
}

/// Random token making a batch delimiter unguessable by captured text
fn batch_nonce() -> String {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(std::process::id());
    format!("{:016x}", hasher.finish())
}

pub(crate) fn batch_delimiter(nonce: &str, session: &str) -> String {
    format!("{}:{}:{}==", BATCH_DELIMITER_PREFIX, nonce, session)
}

/// One invocation: `display-message <delim> ; capture-pane ... ;` per session
pub(crate) fn batch_args(sessions: &[String], options: CaptureOptions, nonce: &str) -> Vec<String> {
    let mut args = Vec::new();
    for (index, session) in sessions.iter().enumerate() {
        if index > 0 {
            args.push(";".to_string());
        }
        args.extend([
            "display-message".to_string(),
            "-p".to_string(),
            "-t".to_string(),
            session.clone(),
            escape_format(&batch_delimiter(nonce, session)),
            ";".to_string(),
        ]);
        args.extend(capture_args(session, options));
    }
    args
}

/// Split a batch response back into per-session text.
///
/// A delimiter only counts when it carries this invocation's nonce and names a
/// requested session that has not been seen yet, so captured text that merely
/// looks like a delimiter stays part of its section.
pub(crate) fn parse_batch_output(
    output: &str,
    sessions: &[String],
    nonce: &str,
) -> MuxResult<HashMap<String, String>> {
    let wanted: HashSet<&str> = sessions.iter().map(String::as_str).collect();
    let prefix = format!("{}:{}:", BATCH_DELIMITER_PREFIX, nonce);

    let mut sections: HashMap<String, Vec<&str>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.split('\n') {
        let delimited = line
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix("=="))
            .filter(|name| wanted.contains(name) && !sections.contains_key(*name));

        if let Some(name) = delimited {
            sections.insert(name.to_string(), Vec::new());
            current = Some(name.to_string());
            continue;
        }

        match current.as_ref().and_then(|name| sections.get_mut(name)) {
            Some(lines) => lines.push(line),
            None if line.is_empty() => {}
            None => {
                return Err(MuxError::Malformed(
                    "batch output before first delimiter".to_string(),
                ))
            }
        }
    }

    let mut captures = HashMap::with_capacity(sessions.len());
    for session in sessions {
        let lines = sections.remove(session).ok_or_else(|| {
            MuxError::Malformed(format!("batch output missing section for {}", session))
        })?;
        captures.insert(session.clone(), normalize_capture(&lines.join("\n")));
    }
    Ok(captures)
}

/// tmux 捕获末尾会带空行
fn normalize_capture(text: &str) -> String {
    text.trim_end_matches('\n').to_string()
}

pub(crate) fn parse_cursor_line(line: &str) -> MuxResult<CursorState> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != 5 {
        return Err(MuxError::Malformed(format!("cursor line: {:?}", line)));
    }
    let number = |value: &str| {
        value
            .parse::<u16>()
            .map_err(|_| MuxError::Malformed(format!("cursor field: {:?}", value)))
    };

    Ok(CursorState {
        col: number(fields[0])?,
        row: number(fields[1])?,
        visible: fields[2] == "1",
        pane_width: number(fields[3])?,
        pane_height: number(fields[4])?,
    })
}

#[async_trait]
impl Multiplexer for TmuxClient {
    async fn capture(&self, target: &str, options: CaptureOptions) -> MuxResult<String> {
        let output = self
            .run_timed("capture-pane", target, &capture_args(target, options))
            .await?;
        Ok(normalize_capture(&output))
    }

    async fn capture_with_cursor(
        &self,
        target: &str,
        options: CaptureOptions,
    ) -> MuxResult<CursorCapture> {
        let mut args = vec![
            "display-message".to_string(),
            "-p".to_string(),
            "-t".to_string(),
            target.to_string(),
            CURSOR_FORMAT.to_string(),
            ";".to_string(),
        ];
        args.extend(capture_args(target, options));

        let output = self.run_timed("capture-pane", target, &args).await?;
        let (cursor_line, text) = output.split_once('\n').unwrap_or((output.as_str(), ""));
        Ok(CursorCapture {
            cursor: parse_cursor_line(cursor_line)?,
            text: normalize_capture(text),
        })
    }

    async fn capture_batch(
        &self,
        sessions: &[String],
        options: CaptureOptions,
    ) -> MuxResult<HashMap<String, String>> {
        if sessions.is_empty() {
            return Ok(HashMap::new());
        }
        let nonce = batch_nonce();
        let target = sessions.join(",");
        let output = self
            .run_timed("capture-pane", &target, &batch_args(sessions, options, &nonce))
            .await?;
        debug!(sessions = sessions.len(), bytes = output.len(), "Batch capture completed");
        parse_batch_output(&output, sessions, &nonce)
    }

    async fn send_key(&self, target: &str, key: &str) -> MuxResult<()> {
        let args = ["send-keys", "-t", target, key].map(String::from);
        self.run("send-keys", target, &args).await.map(|_| ())
    }

    async fn send_literal(&self, target: &str, text: &str) -> MuxResult<()> {
        // -l keeps strings like "Enter" from being read as key names
        let args = ["send-keys", "-t", target, "-l", text].map(String::from);
        self.run("send-keys", target, &args).await.map(|_| ())
    }

    async fn paste(&self, target: &str, text: &str) -> MuxResult<()> {
        self.load_buffer(target, text).await?;
        let buffer = self.buffer_name.as_str();
        let args = ["paste-buffer", "-d", "-b", buffer, "-t", target].map(String::from);
        self.run("paste-buffer", target, &args).await.map(|_| ())
    }

    async fn pane_id(&self, session: &str) -> MuxResult<String> {
        let args = ["display-message", "-p", "-t", session, "#{pane_id}"].map(String::from);
        let output = self.run_timed("display-message", session, &args).await?;
        Ok(output.trim().to_string())
    }

    async fn prefix_key(&self) -> MuxResult<String> {
        let args = ["show-options", "-gv", "prefix"].map(String::from);
        let output = self.run_timed("show-options", "", &args).await?;
        Ok(output.trim().to_string())
    }

    async fn has_session(&self, session: &str) -> bool {
        let args = ["has-session", "-t", session].map(String::from);
        self.run_timed("has-session", session, &args).await.is_ok()
    }

    async fn list_sessions(&self) -> MuxResult<Vec<String>> {
        let args = ["list-sessions", "-F", "#{session_name}"].map(String::from);
        match self.run_timed("list-sessions", "", &args).await {
            Ok(output) => Ok(output.lines().map(|s| s.to_string()).collect()),
            // list-sessions fails when no server (and so no session) exists
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn new_session(&self, session: &str, working_dir: &Path, command: &str) -> MuxResult<()> {
        debug!(session = %session, working_dir = %working_dir.display(), "Creating tmux session");
        let args = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            session.to_string(),
            "-c".to_string(),
            working_dir.display().to_string(),
            command.to_string(),
        ];
        match self.run("new-session", session, &args).await {
            Ok(_) => {
                info!(session = %session, "Tmux session created");
                Ok(())
            }
            Err(err) => {
                error!(session = %session, error = %err, "Failed to create tmux session");
                Err(err)
            }
        }
    }

    async fn kill_session(&self, session: &str) -> MuxResult<()> {
        let args = ["kill-session", "-t", session].map(String::from);
        self.run("kill-session", session, &args).await?;
        info!(session = %session, "Tmux session killed");
        Ok(())
    }
}

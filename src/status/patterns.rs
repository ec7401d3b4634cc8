//! Pattern detection - derive a status from the tail of captured text

use regex::Regex;
use tracing::warn;

use super::Status;
use crate::config::StatusConfig;
use crate::infra::terminal::{last_non_empty_lines, strip_ansi, tail_bytes};

/// Prompts that may sit anywhere in the trailing lines
const WAITING_PATTERNS: &[&str] = &[
    r"(?i)\[y/n\]",
    r"(?i)\(y/n\)",
    r"\[yes/no\]",
    r"\[Y\]es\s*/\s*\[N\]o",
    r"\[A\]lways",
    r"\[是/否\]",
    r"确认[？?]",
    r"(?i)press enter",
    r"(?i)press any key",
    r"按.*继续",
    r"(?i)continue\?",
    r"(?i)proceed\?",
    r"是否继续",
    r"(?i)allow this action",
    r"(?i)allow (edit|bash)",
    r"(?i)do you want to",
    r"允许.*操作",
    r"是否授权",
];

/// Prompts that only count on the very last non-empty line
const LAST_LINE_PATTERNS: &[&str] = &[
    r"^\s*[>❯›»]\s*$",
    r"(?i)\b(enter|input|password|passphrase|username|name|choice|choose|select|token)\b[^:：]*[：:]\s*$",
    r"(请输入|输入|请选择|密码)[^:：]*[：:]\s*$",
];

const THINKING_TAGS: &[(&str, &str)] = &[
    ("<thinking>", "</thinking>"),
    ("<internal_monologue>", "</internal_monologue>"),
];

const DONE_PATTERNS: &[&str] = &[
    r"(?i)task completed",
    r"(?i)\ball done\b",
    r"(?im)^\s*[•\-*·✓✔☑]?\s*done\.?\s*$",
    r"(?i)exited with code 0\b",
    r"(?i)\bgoodbye\b",
];

const ERROR_PATTERNS: &[&str] = &[
    r"(?im)^\s*error(\[E\d+\])?:",
    r"(?im)^\s*fatal:",
    // a non-zero failure count; `0 failed` is a passing summary
    r"(?i)\b[1-9]\d*\s+(tests?\s+)?failed\b",
    r"(?i)exited with code [1-9]",
    r"\bpanicked at\b",
    r"(?m)^\s*\w*(Error|Exception):\s",
    r"(?m)^Traceback \(most recent call last\)",
];

/// Characters stripped from an extracted prompt line (box drawing and prompt glyphs)
const PROMPT_TRIM: &[char] = &['│', '┃', '╭', '╰', '╮', '╯', '─', '>', '❯', '›', '»', ' ', '\t'];

pub struct PatternDetector {
    waiting: Vec<Regex>,
    last_line: Vec<Regex>,
    done: Vec<Regex>,
    error: Vec<Regex>,
    tail_bytes: usize,
    waiting_tail_lines: usize,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Skipping invalid status pattern");
                None
            }
        })
        .collect()
}

impl PatternDetector {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            waiting: compile(WAITING_PATTERNS),
            last_line: compile(LAST_LINE_PATTERNS),
            done: compile(DONE_PATTERNS),
            error: compile(ERROR_PATTERNS),
            tail_bytes: config.tail_bytes,
            waiting_tail_lines: config.waiting_tail_lines,
        }
    }

    /// Classify captured text
    ///
    /// Precedence: waiting prompt, open thinking tag, done, error, active.
    /// Escape sequences are removed first, so styled and plain captures agree.
    pub fn detect(&self, text: &str) -> Status {
        let plain = strip_ansi(tail_bytes(text, self.tail_bytes));
        let tail = plain.as_ref();

        if let Some(prompt) = self.waiting_prompt(tail) {
            return Status::waiting(prompt);
        }

        let lower = tail.to_lowercase();
        if THINKING_TAGS
            .iter()
            .any(|(open, close)| has_unclosed_tag(&lower, open, close))
        {
            return Status::Thinking;
        }

        if self.done.iter().any(|regex| regex.is_match(tail)) {
            return Status::Done;
        }

        if self.error.iter().any(|regex| regex.is_match(tail)) {
            return Status::Error;
        }

        Status::Active
    }

    /// Prompt text of the last waiting line, if any
    pub fn waiting_prompt(&self, text: &str) -> Option<String> {
        let lines = last_non_empty_lines(text, self.waiting_tail_lines);
        let last = lines.last()?;

        if self.last_line.iter().any(|regex| regex.is_match(last)) {
            return Some(extract_prompt(last));
        }

        lines
            .iter()
            .rev()
            .find(|line| self.waiting.iter().any(|regex| regex.is_match(line)))
            .map(|line| extract_prompt(line))
    }
}

fn has_unclosed_tag(text: &str, open: &str, close: &str) -> bool {
    match text.rfind(open) {
        Some(open_at) => text.rfind(close).map_or(true, |close_at| close_at < open_at),
        None => false,
    }
}

fn extract_prompt(line: &str) -> String {
    line.trim_matches(PROMPT_TRIM).to_string()
}

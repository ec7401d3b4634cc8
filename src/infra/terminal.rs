//! Terminal snapshot helpers - byte budgets, tails, escape stripping and fingerprints

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL|ST`) and two-byte escapes
static ANSI_ESCAPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[@-_]").ok()
});

/// `text` without terminal escape sequences; borrowed when there were none
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    match ANSI_ESCAPE.as_ref() {
        Some(regex) => regex.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

/// Trim `text` from the front so that it fits in `max_bytes`.
///
/// The cut is moved forward to a UTF-8 character boundary and then to the start of
/// the next line. If the kept region contains no line break the character-aligned
/// tail is returned as is.
pub fn trim_to_byte_budget(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }

    if text.as_bytes()[start - 1] == b'\n' {
        return &text[start..];
    }

    match text[start..].find('\n') {
        Some(offset) => &text[start + offset + 1..],
        None => &text[start..],
    }
}

/// Last `max_bytes` of `text`, aligned to a character boundary only
pub fn tail_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// The last `n` lines that contain something other than whitespace, oldest first
pub fn last_non_empty_lines(text: &str, n: usize) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .collect();
    lines.reverse();
    lines
}

/// Stable 64-bit FNV-1a hash.
///
/// Used for content fingerprints and per-session stagger; unlike `DefaultHasher` the
/// value does not change between runs.
pub fn stable_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert!(matches!(strip_ansi("plain"), Cow::Borrowed("plain")));
        assert_eq!(strip_ansi("\x1b[1;36m❯\x1b[0m ready"), "❯ ready");
        assert_eq!(strip_ansi("\x1b[?2004hprompt\x1b[?2004l"), "prompt");
        assert_eq!(strip_ansi("\x1b]0;title\x07body"), "body");
        assert_eq!(strip_ansi("a\x1b]8;;http://x\x1b\\link\x1b]8;;\x1b\\b"), "alinkb");
    }

    #[test]
    fn test_trim_short_text_untouched() {
        let text = "line1\nline2\n";
        assert_eq!(trim_to_byte_budget(text, 100), text);
    }

    #[test]
    fn test_trim_aligns_to_next_line() {
        let text = (1..=100).map(|i| format!("line{}", i)).collect::<Vec<_>>().join("\n");
        let trimmed = trim_to_byte_budget(&text, 40);

        assert!(trimmed.len() <= 40);
        assert!(trimmed.starts_with("line"));
        assert!(trimmed.ends_with("line100"));
        let start = text.len() - trimmed.len();
        assert_eq!(text.as_bytes()[start - 1], b'\n');
    }

    #[test]
    fn test_trim_keeps_cut_that_lands_on_line_start() {
        let text = "aaaa\nbbbb\ncccc";
        // cut lands exactly after the second newline
        assert_eq!(trim_to_byte_budget(text, 4), "cccc");
    }

    #[test]
    fn test_trim_never_splits_multibyte_chars() {
        let text = "日本語テキスト\n漢字が並ぶ行\n最後の行です";
        for budget in 1..text.len() {
            let trimmed = trim_to_byte_budget(text, budget);
            assert!(trimmed.len() <= budget, "budget {}", budget);
            // slicing succeeded, so the start is a char boundary; check line alignment
            let start = text.len() - trimmed.len();
            if trimmed.len() < text.len() && text[start..].contains('\n') {
                assert_eq!(text.as_bytes()[start - 1], b'\n', "budget {}", budget);
            }
        }
    }

    #[test]
    fn test_trim_without_newline_keeps_char_aligned_tail() {
        let text = "ééééé";
        let trimmed = trim_to_byte_budget(text, 5);
        assert_eq!(trimmed, "éé");
    }

    #[test]
    fn test_tail_bytes() {
        assert_eq!(tail_bytes("hello world", 5), "world");
        assert_eq!(tail_bytes("héllo", 4), "llo");
        assert_eq!(tail_bytes("short", 64), "short");
    }

    #[test]
    fn test_last_non_empty_lines() {
        let text = "one\n\ntwo\n   \nthree\nfour\n\n";
        assert_eq!(last_non_empty_lines(text, 2), vec!["three", "four"]);
        assert_eq!(last_non_empty_lines(text, 10), vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash("cam-1"), stable_hash("cam-1"));
        assert_ne!(stable_hash("cam-1"), stable_hash("cam-2"));
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
    }
}

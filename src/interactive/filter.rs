//! Leaked-sequence filter
//!
//! When the host terminal splits a mouse report across reads, its tail arrives as
//! ordinary text (`[<64;10;5M`, `<65;3;7m`, `64;10;5`). These must never reach the
//! pane.

/// Whether `text` looks like the remains of an SGR/X10 mouse report
pub fn is_mouse_fragment(text: &str) -> bool {
    let s = text.strip_prefix('\x1b').unwrap_or(text);
    let s = s
        .strip_prefix("M[")
        .or_else(|| s.strip_prefix("m["))
        .or_else(|| s.strip_prefix('['))
        .unwrap_or(s);
    let s = s.strip_prefix('<').unwrap_or(s);

    let (body, terminated) = match s.strip_suffix(&['M', 'm'][..]) {
        Some(body) => (body, true),
        None => (s, false),
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == ';') {
        return false;
    }

    let separators = body.matches(';').count();
    let has_digit = body.chars().any(|c| c.is_ascii_digit());
    has_digit && separators >= 1 && (terminated || separators >= 2)
}

/// Plain typed text: letters, digits, punctuation and spaces only
pub fn is_simple_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c == ' ' || c.is_alphanumeric() || c.is_ascii_punctuation())
}

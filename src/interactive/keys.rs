//! Key mapping - host input events to tmux `send-keys` syntax

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseInput {
    ScrollUp,
    ScrollDown,
    Other,
}

/// Input as the passthrough sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Typed text (one char or a batch the terminal delivered at once)
    Text(String),
    /// Text the terminal flagged as a paste
    Paste(String),
    Mouse(MouseInput),
}

impl InputEvent {
    pub fn from_crossterm(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Release => None,
            Event::Key(key) => match key.code {
                KeyCode::Char(c) if (key.modifiers - KeyModifiers::SHIFT).is_empty() => {
                    Some(InputEvent::Text(c.to_string()))
                }
                _ => Some(InputEvent::Key(key)),
            },
            Event::Paste(text) => Some(InputEvent::Paste(text)),
            Event::Mouse(MouseEvent { kind, .. }) => Some(InputEvent::Mouse(match kind {
                MouseEventKind::ScrollUp => MouseInput::ScrollUp,
                MouseEventKind::ScrollDown => MouseInput::ScrollDown,
                _ => MouseInput::Other,
            })),
            _ => None,
        }
    }

    pub fn is_escape(&self) -> bool {
        matches!(self, InputEvent::Key(key) if key.code == KeyCode::Esc && key.modifiers.is_empty())
    }
}

/// One `send-keys` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmuxInput {
    /// Symbolic key name (`Enter`, `C-c`)
    Key(String),
    /// Text sent with `send-keys -l`
    Literal(String),
}

/// Map a key event; `None` for keys tmux has no name for
pub fn key_to_tmux(key: &KeyEvent) -> Option<TmuxInput> {
    let modifiers = key.modifiers;

    if let KeyCode::Char(c) = key.code {
        return Some(if modifiers.contains(KeyModifiers::CONTROL) {
            TmuxInput::Key(format!("C-{}", c))
        } else if modifiers.contains(KeyModifiers::ALT) {
            TmuxInput::Key(format!("M-{}", c))
        } else {
            // shift is already in the char
            TmuxInput::Literal(c.to_string())
        });
    }

    if key.code == KeyCode::BackTab {
        return Some(TmuxInput::Key("BTab".to_string()));
    }

    let base = match key.code {
        KeyCode::Enter => "Enter",
        KeyCode::Backspace => "BSpace",
        KeyCode::Tab => "Tab",
        KeyCode::Esc => "Escape",
        KeyCode::Up => "Up",
        KeyCode::Down => "Down",
        KeyCode::Left => "Left",
        KeyCode::Right => "Right",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::PageUp => "PageUp",
        KeyCode::PageDown => "PageDown",
        KeyCode::Delete => "DC",
        KeyCode::Insert => "IC",
        KeyCode::F(n) if (1..=12).contains(&n) => {
            return Some(TmuxInput::Key(with_modifiers(&format!("F{}", n), modifiers)))
        }
        _ => return None,
    };

    Some(TmuxInput::Key(with_modifiers(base, modifiers)))
}

fn with_modifiers(base: &str, modifiers: KeyModifiers) -> String {
    let mut key = base.to_string();
    if modifiers.contains(KeyModifiers::SHIFT) {
        key = format!("S-{}", key);
    }
    if modifiers.contains(KeyModifiers::ALT) {
        key = format!("M-{}", key);
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        key = format!("C-{}", key);
    }
    key
}

/// Keys that count as deliberate typing for snap-back
pub fn is_navigation(key: &KeyEvent) -> bool {
    matches!(
        key.code,
        KeyCode::Up
            | KeyCode::Down
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::Home
            | KeyCode::End
            | KeyCode::PageUp
            | KeyCode::PageDown
            | KeyCode::Enter
            | KeyCode::Backspace
            | KeyCode::Delete
            | KeyCode::Tab
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, MouseButton};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn tmux_key(name: &str) -> Option<TmuxInput> {
        Some(TmuxInput::Key(name.to_string()))
    }

    #[test]
    fn test_plain_char_is_literal() {
        assert_eq!(
            key_to_tmux(&key(KeyCode::Char(';'), KeyModifiers::NONE)),
            Some(TmuxInput::Literal(";".into()))
        );
    }

    #[test]
    fn test_modified_chars() {
        assert_eq!(key_to_tmux(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)), tmux_key("C-c"));
        assert_eq!(key_to_tmux(&key(KeyCode::Char('x'), KeyModifiers::ALT)), tmux_key("M-x"));
    }

    #[test]
    fn test_special_keys() {
        assert_eq!(key_to_tmux(&key(KeyCode::Enter, KeyModifiers::NONE)), tmux_key("Enter"));
        assert_eq!(key_to_tmux(&key(KeyCode::Backspace, KeyModifiers::NONE)), tmux_key("BSpace"));
        assert_eq!(key_to_tmux(&key(KeyCode::Up, KeyModifiers::SHIFT)), tmux_key("S-Up"));
        assert_eq!(
            key_to_tmux(&key(KeyCode::Left, KeyModifiers::CONTROL | KeyModifiers::ALT)),
            tmux_key("C-M-Left")
        );
        assert_eq!(key_to_tmux(&key(KeyCode::F(5), KeyModifiers::NONE)), tmux_key("F5"));
        assert_eq!(key_to_tmux(&key(KeyCode::BackTab, KeyModifiers::SHIFT)), tmux_key("BTab"));
    }

    #[test]
    fn test_unmapped_keys() {
        assert_eq!(key_to_tmux(&key(KeyCode::F(20), KeyModifiers::NONE)), None);
        assert_eq!(key_to_tmux(&key(KeyCode::CapsLock, KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_from_crossterm() {
        let typed = Event::Key(key(KeyCode::Char('A'), KeyModifiers::SHIFT));
        assert_eq!(InputEvent::from_crossterm(typed), Some(InputEvent::Text("A".into())));

        let ctrl = key(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(
            InputEvent::from_crossterm(Event::Key(ctrl)),
            Some(InputEvent::Key(ctrl))
        );

        let release = KeyEvent {
            code: KeyCode::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(InputEvent::from_crossterm(Event::Key(release)), None);

        let scroll = Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 3,
            row: 4,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(
            InputEvent::from_crossterm(scroll),
            Some(InputEvent::Mouse(MouseInput::ScrollUp))
        );

        let click = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(
            InputEvent::from_crossterm(click),
            Some(InputEvent::Mouse(MouseInput::Other))
        );
    }

    #[test]
    fn test_is_escape() {
        assert!(InputEvent::Key(key(KeyCode::Esc, KeyModifiers::NONE)).is_escape());
        assert!(!InputEvent::Key(key(KeyCode::Esc, KeyModifiers::ALT)).is_escape());
        assert!(!InputEvent::Text("\x1b".into()).is_escape());
    }

    #[test]
    fn test_navigation() {
        assert!(is_navigation(&key(KeyCode::Up, KeyModifiers::NONE)));
        assert!(!is_navigation(&key(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(!is_navigation(&key(KeyCode::F(1), KeyModifiers::NONE)));
    }
}

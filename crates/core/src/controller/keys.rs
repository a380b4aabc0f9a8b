/// Keys the player responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Character(char),
    Other,
}

impl Key {
    /// Parses a browser-style key name (`" "`, `"ArrowLeft"`, `"m"`).
    pub fn from_name(name: &str) -> Self {
        match name {
            " " | "Space" | "space" => Self::Space,
            "ArrowLeft" | "left" => Self::ArrowLeft,
            "ArrowRight" | "right" => Self::ArrowRight,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Character(c),
                    _ => Self::Other,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Focus is in a text field; shortcuts must not fire.
    pub in_text_input: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            in_text_input: false,
        }
    }
}

/// What a key press maps to in the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    TogglePlay,
    SeekBy(f64),
    ToggleMute,
}

impl KeyEvent {
    pub fn action(&self, seek_step: f64) -> Option<KeyAction> {
        if self.in_text_input {
            return None;
        }
        match self.key {
            Key::Space => Some(KeyAction::TogglePlay),
            Key::ArrowLeft => Some(KeyAction::SeekBy(-seek_step)),
            Key::ArrowRight => Some(KeyAction::SeekBy(seek_step)),
            Key::Character('m' | 'M') => Some(KeyAction::ToggleMute),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_key_names() {
        assert_eq!(Key::from_name(" "), Key::Space);
        assert_eq!(Key::from_name("ArrowRight"), Key::ArrowRight);
        assert_eq!(Key::from_name("M"), Key::Character('M'));
        assert_eq!(Key::from_name("Enter"), Key::Other);
    }

    #[test]
    fn maps_the_shortcut_contract() {
        assert_eq!(KeyEvent::new(Key::Space).action(5.0), Some(KeyAction::TogglePlay));
        assert_eq!(
            KeyEvent::new(Key::ArrowLeft).action(5.0),
            Some(KeyAction::SeekBy(-5.0))
        );
        assert_eq!(
            KeyEvent::new(Key::Character('m')).action(5.0),
            Some(KeyAction::ToggleMute)
        );
        assert_eq!(KeyEvent::new(Key::Character('x')).action(5.0), None);
    }

    #[test]
    fn text_inputs_swallow_shortcuts() {
        let event = KeyEvent {
            key: Key::Space,
            in_text_input: true,
        };
        assert_eq!(event.action(5.0), None);
    }
}

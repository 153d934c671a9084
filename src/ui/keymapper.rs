//! Key mapping for the input field
//!
//! Converts crossterm key events to keystroke tokens for the bridge.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::KeystrokeEvent;

/// What a key press asks the front-end to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Feed these events to the bridge, in order
    Keys(Vec<KeystrokeEvent>),
    /// Paste clipboard text
    Paste,
    Quit,
    None,
}

/// Key mapper for converting key events to keystroke events
pub struct KeyMapper;

impl KeyMapper {
    pub fn map(event: &KeyEvent) -> KeyAction {
        if event.kind == KeyEventKind::Release {
            return KeyAction::None;
        }
        let mods = event.modifiers;

        match event.code {
            KeyCode::Char(ch) if mods.contains(KeyModifiers::CONTROL) => match ch.to_ascii_lowercase() {
                'q' => KeyAction::Quit,
                'v' => KeyAction::Paste,
                _ => KeyAction::None,
            },
            KeyCode::Char(_) if mods.contains(KeyModifiers::ALT) => KeyAction::None,
            KeyCode::Char(ch) => KeyAction::Keys(vec![KeystrokeEvent::key(ch.to_string())]),

            KeyCode::Enter => KeyAction::Keys(enter().to_vec()),

            KeyCode::Tab => KeyAction::Keys(vec![KeystrokeEvent::key("\t")]),

            _ => KeyAction::None,
        }
    }

    /// Keystroke events for pasted text, one per character.
    ///
    /// Every pasted newline sends the line like Enter does.
    pub fn paste(text: &str) -> Vec<KeystrokeEvent> {
        let mut events = Vec::new();
        for c in text.chars() {
            match c {
                '\n' => events.extend(enter()),
                '\t' => events.push(KeystrokeEvent::key("\t")),
                c if c.is_control() => {}
                c => events.push(KeystrokeEvent::key(c.to_string())),
            }
        }
        events
    }
}

// The newline is part of the line sent to the shell
fn enter() -> [KeystrokeEvent; 2] {
    [KeystrokeEvent::key("\n"), KeystrokeEvent::commit()]
}

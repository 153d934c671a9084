//! Command line assembly from keyboard tokens
//!
//! Every key press arrives as a short text token. Printable tokens are
//! appended to the pending line; the commit token sends the pending line to
//! the shell and starts a new one.

use std::io::Write;

use tracing::{error, info, trace, warn};

use super::error::BridgeError;
use super::hexdump::dump_buffer;
use super::sink::DisplaySink;

/// Token of the keyboard's Enter key (U+F8A2, new-line symbol)
pub const COMMIT_TOKEN: &str = "\u{F8A2}";

/// Kind of a keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    /// A key was pressed and its token selected
    ValueChanged,
    /// The input field gained or lost focus
    Focused,
    Defocused,
}

/// One keyboard event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystrokeEvent {
    pub code: EventCode,
    /// Label of the pressed key, if any
    pub key: Option<String>,
}

impl KeystrokeEvent {
    /// A value-changed event for a pressed key
    pub fn key(token: impl Into<String>) -> Self {
        Self {
            code: EventCode::ValueChanged,
            key: Some(token.into()),
        }
    }

    pub fn commit() -> Self {
        Self::key(COMMIT_TOKEN)
    }

    /// Focus change of the input field; carries no token
    pub fn focus(gained: bool) -> Self {
        Self {
            code: if gained {
                EventCode::Focused
            } else {
                EventCode::Defocused
            },
            key: None,
        }
    }
}

/// What an event did to the pending line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Not a key event, no token, or commit on an empty line
    Ignored,
    Appended,
    /// Line exceeded the configured maximum, token dropped
    Rejected,
    /// Line written to the shell
    Sent(usize),
    /// Write failed; the line was cleared anyway
    SendFailed,
}

/// Return true if `token` is the commit token
///
/// Only the first three bytes are compared.
pub fn is_commit_token(token: &str) -> bool {
    let commit = COMMIT_TOKEN.as_bytes();
    token.as_bytes().get(..commit.len()) == Some(commit)
}

#[derive(Debug, Default)]
pub struct InputAssembler {
    pending: Vec<u8>,
    max_len: Option<usize>,
}

impl InputAssembler {
    pub fn new(max_len: Option<usize>) -> Self {
        Self {
            pending: Vec::new(),
            max_len,
        }
    }

    /// Keystrokes typed but not yet sent
    #[cfg(test)]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn handle_event<W>(&mut self, event: &KeystrokeEvent, shell_input: &mut W, sink: &mut dyn DisplaySink) -> InputOutcome
    where
        W: Write + ?Sized,
    {
        if event.code != EventCode::ValueChanged {
            return InputOutcome::Ignored;
        }
        let Some(key) = event.key.as_deref().filter(|k| !k.is_empty()) else {
            return InputOutcome::Ignored;
        };
        trace!("key[0]={}, key={:?}", key.as_bytes()[0], key);

        if is_commit_token(key) {
            self.commit(shell_input, sink)
        } else {
            self.append(key, sink)
        }
    }

    fn append(&mut self, key: &str, sink: &mut dyn DisplaySink) -> InputOutcome {
        if let Some(max) = self.max_len {
            if self.pending.len() + key.len() > max {
                warn!("Command line limit of {} bytes reached, dropping {:?}", max, key);
                return InputOutcome::Rejected;
            }
        }
        self.pending.extend_from_slice(key.as_bytes());
        sink.set_input_text(&String::from_utf8_lossy(&self.pending));
        InputOutcome::Appended
    }

    fn commit<W>(&mut self, shell_input: &mut W, sink: &mut dyn DisplaySink) -> InputOutcome
    where
        W: Write + ?Sized,
    {
        if self.pending.is_empty() {
            return InputOutcome::Ignored;
        }
        trace!("command\n{}", dump_buffer(&self.pending));

        let outcome = match shell_input.write_all(&self.pending).and_then(|_| shell_input.flush()) {
            Ok(()) => {
                info!("write shell stdin: {}", self.pending.len());
                InputOutcome::Sent(self.pending.len())
            }
            Err(e) => {
                error!("{}", BridgeError::WriteFailed(e));
                InputOutcome::SendFailed
            }
        };

        // Fire and forget: the line is gone whether or not the write landed
        self.pending.clear();
        sink.clear_input();
        outcome
    }
}

//! Escape code removal
//!
//! Shell line editors emit short cursor-control sequences such as
//! `ESC [ K`. Instead of parsing them, every ESC and the two bytes after it
//! are overwritten with spaces.

use serde::{Deserialize, Serialize};

/// Escape-introducer byte
pub const ESC: u8 = 0x1b;

/// Bytes blanked per escape, the ESC included
pub const WINDOW: usize = 3;

/// How escape windows are treated at read boundaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    /// Every read is filtered on its own
    #[default]
    Fixed,
    /// A window cut off by the end of a read continues into the next read
    Carry,
}

/// Replace escape codes in `buf` with spaces.
///
/// Stateless: a window that runs past the end of `buf` is clamped.
pub fn remove_escape_codes(buf: &mut [u8]) {
    EscapeFilter::default().filter(buf);
}

/// Escape filter that remembers an unfinished window between reads
#[derive(Debug, Default, Clone)]
pub struct EscapeFilter {
    /// Bytes of the last window still to be blanked
    pending: usize,
}

impl EscapeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, buf: &mut [u8]) {
        let len = buf.len();
        let mut i = 0;

        while self.pending > 0 && i < len {
            buf[i] = b' ';
            self.pending -= 1;
            i += 1;
        }

        while i < len {
            if buf[i] == ESC {
                let end = (i + WINDOW).min(len);
                buf[i..end].fill(b' ');
                self.pending = i + WINDOW - end;
                i = end;
            } else {
                i += 1;
            }
        }
    }
}

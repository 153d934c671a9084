//! Terminal view model
//!
//! Holds the output region (a bounded list of lines), the input field and a
//! status message. The renderer draws it; the bridge writes to it through
//! [`DisplaySink`].

use std::collections::VecDeque;

use bitflags::bitflags;

use crate::core::DisplaySink;

/// Tab stop width used when expanding `\t` in shell output
pub const TAB_WIDTH: usize = 8;

bitflags! {
    /// Regions changed since the last draw
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Damage: u8 {
        const OUTPUT = 0b001;
        const STATUS = 0b010;
        const INPUT  = 0b100;
    }
}

#[derive(Debug)]
pub struct TerminalView {
    lines: VecDeque<String>,
    input: String,
    status: String,
    max_lines: usize,
    damage: Damage,
}

impl TerminalView {
    pub fn new(max_lines: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(String::new());
        Self {
            lines,
            input: String::new(),
            status: String::new(),
            max_lines: max_lines.max(1),
            damage: Damage::all(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.damage |= Damage::STATUS;
    }

    pub fn is_dirty(&self) -> bool {
        !self.damage.is_empty()
    }

    pub fn damage(&self) -> Damage {
        self.damage
    }

    /// Mark everything as redrawn
    pub fn mark_clean(&mut self) {
        self.damage = Damage::empty();
    }

    /// Force a full redraw, e.g. after a resize
    pub fn mark_dirty(&mut self) {
        self.damage = Damage::all();
    }

    fn current_line(&mut self) -> &mut String {
        if self.lines.is_empty() {
            self.lines.push_back(String::new());
        }
        // Never empty after the push above
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    fn new_line(&mut self) {
        self.lines.push_back(String::new());
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }
}

impl DisplaySink for TerminalView {
    fn append_output(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '\n' => self.new_line(),
                // Carriage returns from CRLF output
                '\r' => {}
                '\t' => {
                    let line = self.current_line();
                    let col = line.chars().count();
                    let pad = TAB_WIDTH - col % TAB_WIDTH;
                    line.extend(std::iter::repeat(' ').take(pad));
                }
                c if c.is_control() => {}
                c => self.current_line().push(c),
            }
        }
        self.damage |= Damage::OUTPUT;
    }

    fn set_input_text(&mut self, text: &str) {
        self.input = text.to_string();
        self.damage |= Damage::INPUT;
    }
}

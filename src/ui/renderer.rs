//! Terminal renderer using crossterm
//!
//! Draws a [`TerminalView`] full screen: the output region on top, a
//! status row, and the `> ` input row at the bottom.

use std::fs::OpenOptions;
use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableFocusChange, EnableFocusChange},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::view::{Damage, TerminalView};

/// Prompt shown in front of the input field
pub const INPUT_PROMPT: &str = "> ";

/// Rows used by the status and input lines
const CHROME_ROWS: u16 = 2;

/// Terminal renderer
pub struct Renderer {
    out: Box<dyn Write>,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Renderer {
    /// Render to stdout
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Render to the controlling terminal, for when stdout is redirected
    pub fn to_tty() -> io::Result<Self> {
        let tty = OpenOptions::new().write(true).open("/dev/tty")?;
        Ok(Self::with_output(Box::new(tty)))
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self {
            out,
            initialized: false,
        }
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.out,
            EnterAlternateScreen,
            EnableFocusChange,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let _ = execute!(self.out, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(
            self.out,
            Show,
            EnableLineWrap,
            DisableFocusChange,
            LeaveAlternateScreen
        );
        let _ = self.out.flush();

        terminal::disable_raw_mode()
    }

    /// Current terminal size as (cols, rows)
    pub fn size(&self) -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Redraw the regions of the view that changed
    pub fn render(&mut self, view: &TerminalView) -> io::Result<()> {
        let (cols, rows) = self.size()?;
        let frame = layout(view, cols, rows);
        let damage = view.damage();

        queue!(self.out, Hide)?;
        for (row, text) in frame.rows.iter().enumerate() {
            if !damage.intersects(frame.region(row as u16)) {
                continue;
            }
            queue!(
                self.out,
                MoveTo(0, row as u16),
                Clear(ClearType::CurrentLine)
            )?;
            if row as u16 == frame.status_row {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Reverse),
                    Print(text),
                    SetAttribute(Attribute::Reset)
                )?;
            } else {
                queue!(self.out, Print(text))?;
            }
        }
        queue!(self.out, MoveTo(frame.cursor.0, frame.cursor.1), Show)?;
        self.out.flush()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Screen contents computed from a view, one string per row
#[derive(Debug, PartialEq, Eq)]
struct Frame {
    rows: Vec<String>,
    status_row: u16,
    cursor: (u16, u16),
}

impl Frame {
    /// View region a screen row belongs to
    fn region(&self, row: u16) -> Damage {
        match row.cmp(&self.status_row) {
            std::cmp::Ordering::Less => Damage::OUTPUT,
            std::cmp::Ordering::Equal => Damage::STATUS,
            std::cmp::Ordering::Greater => Damage::INPUT,
        }
    }
}

fn layout(view: &TerminalView, cols: u16, rows: u16) -> Frame {
    let width = cols.max(1) as usize;
    let output_rows = rows.saturating_sub(CHROME_ROWS) as usize;

    // Only the tail of the output fits
    let mut wrapped: Vec<String> = Vec::new();
    for line in view.lines() {
        wrapped.extend(wrap_line(line, width));
    }
    let skip = wrapped.len().saturating_sub(output_rows);
    let mut screen: Vec<String> = wrapped.into_iter().skip(skip).collect();
    screen.resize(output_rows, String::new());

    let status_row = output_rows as u16;
    screen.push(status_line(view.status(), width));

    // Keep the end of a long input line visible
    let input = format!("{}{}", INPUT_PROMPT, view.input());
    let shown = tail_by_width(&input, width.saturating_sub(1));
    let cursor_col = UnicodeWidthStr::width(shown) as u16;
    screen.push(shown.to_string());

    Frame {
        rows: screen,
        status_row,
        cursor: (cursor_col, status_row + 1),
    }
}

fn status_line(status: &str, width: usize) -> String {
    let mut line = truncate_to_width(status, width);
    let pad = width.saturating_sub(UnicodeWidthStr::width(line.as_str()));
    line.extend(std::iter::repeat(' ').take(pad));
    line
}

/// Split a line into pieces no wider than `width` columns
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for ch in line.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(ch);
        used += w;
    }
    pieces.push(current);
    pieces
}

fn truncate_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}

fn tail_by_width(text: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, ch) in text.char_indices().rev() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            return &text[idx + ch.len_utf8()..];
        }
        used += w;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DisplaySink;

    #[test]
    fn test_wrap_line() {
        assert_eq!(wrap_line("", 4), vec![""]);
        assert_eq!(wrap_line("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_line("abcd", 4), vec!["abcd"]);
    }

    #[test]
    fn test_wrap_wide_chars() {
        // Each of these takes two columns
        assert_eq!(wrap_line("日本語", 4), vec!["日本", "語"]);
        assert_eq!(wrap_line("a日本", 4), vec!["a日", "本"]);
    }

    #[test]
    fn test_tail_by_width() {
        assert_eq!(tail_by_width("> hello", 20), "> hello");
        assert_eq!(tail_by_width("> hello", 3), "llo");
        assert_eq!(tail_by_width("日本語", 4), "本語");
    }

    #[test]
    fn test_layout() {
        let mut view = TerminalView::new(100);
        view.append_output("one\ntwo\nthree");
        view.set_input_text("ls");
        view.set_status("running");

        let frame = layout(&view, 10, 4);
        assert_eq!(frame.rows.len(), 4);
        assert_eq!(frame.rows[0], "two");
        assert_eq!(frame.rows[1], "three");
        assert_eq!(frame.rows[2], "running   ");
        assert_eq!(frame.rows[3], "> ls");
        assert_eq!(frame.status_row, 2);
        assert_eq!(frame.cursor, (4, 3));
    }

    #[test]
    fn test_row_regions() {
        let view = TerminalView::new(10);
        let frame = layout(&view, 10, 5);
        assert_eq!(frame.region(0), Damage::OUTPUT);
        assert_eq!(frame.region(2), Damage::OUTPUT);
        assert_eq!(frame.region(3), Damage::STATUS);
        assert_eq!(frame.region(4), Damage::INPUT);
    }

    #[test]
    fn test_layout_pads_short_output() {
        let view = TerminalView::new(100);
        let frame = layout(&view, 8, 5);
        assert_eq!(&frame.rows[..3], &["", "", ""]);
        assert_eq!(frame.rows[4], "> ");
    }
}

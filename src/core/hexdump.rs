//! Hex dump formatting for trace logs

use std::fmt::Write;

const BYTES_PER_ROW: usize = 16;

/// Format `bytes` as offset, hex and ASCII columns, 16 bytes per row.
///
/// ```text
/// 0000  6e 73 68 3e 20 1b 5b 4b                          nsh> .[K
/// ```
pub fn dump_buffer(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let _ = write!(out, "{:04x}  ", row * BYTES_PER_ROW);
        for i in 0..BYTES_PER_ROW {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("   "),
            }
        }
        out.push(' ');
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_short_row() {
        let dump = dump_buffer(b"ls -l\n");
        assert_eq!(
            dump,
            "0000  6c 73 20 2d 6c 0a                                ls -l.\n"
        );
    }

    #[test]
    fn test_dump_rows() {
        let dump = dump_buffer(b"0123456789abcdefXY");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  30 31 32"));
        assert!(lines[0].ends_with("0123456789abcdef"));
        assert!(lines[1].starts_with("0010  58 59"));
        assert!(lines[1].ends_with("XY"));
    }

    #[test]
    fn test_dump_empty() {
        assert_eq!(dump_buffer(b""), "");
    }
}

//! Output poller
//!
//! Runs once per scheduler tick. Drains whatever the shell wrote to stdout
//! and stderr since the previous tick, without ever waiting for more.

use std::io;

use tracing::{debug, trace, warn};

use super::error::BridgeError;
use super::filter::{remove_escape_codes, EscapeFilter, EscapeMode};
use super::hexdump::dump_buffer;
use super::pipe::{ChannelKind, StreamSource};
use super::sink::DisplaySink;

/// Default poll buffer capacity in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// One data byte plus the terminator
pub const MIN_BUFFER_SIZE: usize = 2;

pub struct OutputPoller {
    /// Scratch buffer reused by every read
    buf: Vec<u8>,
    mode: EscapeMode,
    output_filter: EscapeFilter,
    error_filter: EscapeFilter,
}

impl OutputPoller {
    pub fn new(buffer_size: usize, mode: EscapeMode) -> Self {
        Self {
            buf: vec![0; buffer_size.max(MIN_BUFFER_SIZE)],
            mode,
            output_filter: EscapeFilter::new(),
            error_filter: EscapeFilter::new(),
        }
    }

    /// Poll buffer capacity, terminator included
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Poll stdout, then stderr. Returns the number of bytes appended.
    ///
    /// Within one tick stdout bytes always reach the sink before stderr
    /// bytes, whichever was written first.
    pub fn tick<O, E>(&mut self, output: &mut O, error: &mut E, sink: &mut dyn DisplaySink) -> usize
    where
        O: StreamSource + ?Sized,
        E: StreamSource + ?Sized,
    {
        let appended = self.poll_stream(ChannelKind::Output, output, sink);
        appended + self.poll_stream(ChannelKind::Error, error, sink)
    }

    /// At most one read from `source`, filtered and appended to `sink`
    pub fn poll_stream<S>(&mut self, kind: ChannelKind, source: &mut S, sink: &mut dyn DisplaySink) -> usize
    where
        S: StreamSource + ?Sized,
    {
        match source.has_input() {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(err) => {
                warn!("{}", BridgeError::PollCheckFailed { channel: kind, source: err });
                return 0;
            }
        }

        // Always leave room for the terminator
        let limit = self.buf.len() - 1;
        let n = match source.read_chunk(&mut self.buf[..limit]) {
            Ok(0) => {
                debug!("{} reached end of stream", kind);
                return 0;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return 0;
            }
            Err(err) => {
                warn!("{}", BridgeError::ReadFailed { channel: kind, source: err });
                return 0;
            }
        };
        self.buf[n] = 0;
        trace!("{} read {} bytes\n{}", kind, n, dump_buffer(&self.buf[..n]));

        match (self.mode, kind) {
            (EscapeMode::Fixed, _) => remove_escape_codes(&mut self.buf[..n]),
            (EscapeMode::Carry, ChannelKind::Error) => self.error_filter.filter(&mut self.buf[..n]),
            (EscapeMode::Carry, _) => self.output_filter.filter(&mut self.buf[..n]),
        }

        sink.append_output(&String::from_utf8_lossy(&self.buf[..n]));
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipe::{PipeSet, SystemPipes};
    use crate::core::sink::MemorySink;
    use nix::errno::Errno;
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::Write;

    struct MockSource {
        ready: nix::Result<bool>,
        chunks: VecDeque<io::Result<Vec<u8>>>,
        requested: Vec<usize>,
    }

    impl MockSource {
        fn with_chunks(chunks: &[&str]) -> Self {
            Self {
                ready: Ok(true),
                chunks: chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
                requested: Vec::new(),
            }
        }

        fn idle() -> Self {
            Self {
                ready: Ok(false),
                chunks: VecDeque::new(),
                requested: Vec::new(),
            }
        }
    }

    impl StreamSource for MockSource {
        fn has_input(&self) -> nix::Result<bool> {
            self.ready
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.requested.push(buf.len());
            match self.chunks.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_bounded_read() {
        let data = "a".repeat(100);
        let mut output = MockSource::with_chunks(&[data.as_str()]);
        let mut error = MockSource::idle();
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        let appended = poller.tick(&mut output, &mut error, &mut sink);

        assert_eq!(appended, 63);
        assert_eq!(output.requested, vec![63]);
        assert_eq!(poller.buf[63], 0);
        assert_eq!(sink.output, "a".repeat(63));
    }

    #[test]
    fn test_buffer_terminated_after_short_read() {
        let mut output = MockSource::with_chunks(&["xyz"]);
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(8, EscapeMode::Fixed);
        poller.buf.fill(b'#');

        poller.poll_stream(ChannelKind::Output, &mut output, &mut sink);

        assert_eq!(&poller.buf[..4], b"xyz\0");
    }

    #[test]
    fn test_one_read_per_stream_per_tick() {
        let mut output = MockSource::with_chunks(&["first", "second"]);
        let mut error = MockSource::idle();
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        poller.tick(&mut output, &mut error, &mut sink);
        assert_eq!(sink.output, "first");
        poller.tick(&mut output, &mut error, &mut sink);
        assert_eq!(sink.output, "firstsecond");
    }

    #[test]
    fn test_output_before_error() {
        let (mut bridge, shell) = PipeSet::open(&mut SystemPipes).unwrap().split();
        let mut shell_stdout = File::from(shell.stdout);
        let mut shell_stderr = File::from(shell.stderr);

        // stderr is written first but stdout must still come first
        shell_stderr.write_all(b"err").unwrap();
        shell_stdout.write_all(b"out").unwrap();

        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);
        poller.tick(&mut bridge.output, &mut bridge.error, &mut sink);

        assert_eq!(sink.appends, vec!["out".to_string(), "err".to_string()]);
    }

    #[test]
    fn test_not_ready_skips_read() {
        let mut output = MockSource::idle();
        let mut error = MockSource::idle();
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        assert_eq!(poller.tick(&mut output, &mut error, &mut sink), 0);
        assert!(output.requested.is_empty());
        assert!(sink.appends.is_empty());
    }

    #[test]
    fn test_poll_failure_is_not_fatal() {
        let mut output = MockSource::with_chunks(&["lost"]);
        output.ready = Err(Errno::EINTR);
        let mut error = MockSource::with_chunks(&["kept"]);
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        poller.tick(&mut output, &mut error, &mut sink);

        assert!(output.requested.is_empty());
        assert_eq!(sink.output, "kept");
    }

    #[test]
    fn test_failed_or_empty_read_appends_nothing() {
        let mut output = MockSource::with_chunks(&[]);
        output.chunks.push_back(Err(io::Error::new(io::ErrorKind::Other, "boom")));
        let mut error = MockSource::with_chunks(&[""]);
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        assert_eq!(poller.tick(&mut output, &mut error, &mut sink), 0);
        assert!(sink.appends.is_empty());
    }

    #[test]
    fn test_escape_codes_removed() {
        let mut output = MockSource::with_chunks(&["one\nnsh> \x1b[K"]);
        let mut error = MockSource::idle();
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Fixed);

        poller.tick(&mut output, &mut error, &mut sink);

        assert_eq!(sink.output, "one\nnsh>    ");
    }

    #[test]
    fn test_carry_mode_spans_ticks() {
        let mut output = MockSource::with_chunks(&["nsh> \x1b", "[Kls"]);
        let mut error = MockSource::idle();
        let mut sink = MemorySink::default();
        let mut poller = OutputPoller::new(64, EscapeMode::Carry);

        poller.tick(&mut output, &mut error, &mut sink);
        poller.tick(&mut output, &mut error, &mut sink);

        assert_eq!(sink.output, "nsh>    ls");
    }

    #[test]
    fn test_capacity_has_floor() {
        assert_eq!(OutputPoller::new(0, EscapeMode::Fixed).capacity(), MIN_BUFFER_SIZE);
        assert_eq!(OutputPoller::new(128, EscapeMode::Fixed).capacity(), 128);
    }
}

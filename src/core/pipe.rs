//! Pipe wiring between the bridge and the shell
//!
//! Each standard stream of the shell gets its own unidirectional [`Channel`].
//! The bridge keeps the GUI-facing end of every channel ([`BridgeEnds`]) and
//! hands the opposite end to the shell ([`ShellEnds`]).

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::dup2;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
use nix::unistd::pipe;
use tracing::{debug, error, warn};

use super::error::{BridgeError, Result};

/// Which shell stream a channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Input,
    Output,
    Error,
}

impl ChannelKind {
    /// Standard descriptor slot the shell sees this channel on
    pub fn std_slot(self) -> RawFd {
        match self {
            ChannelKind::Input => 0,
            ChannelKind::Output => 1,
            ChannelKind::Error => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Input => "stdin",
            ChannelKind::Output => "stdout",
            ChannelKind::Error => "stderr",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unidirectional pipe: bytes written to `write` come out of `read`
#[derive(Debug)]
pub struct Channel {
    read: OwnedFd,
    write: OwnedFd,
}

impl Channel {
    pub fn new(read: OwnedFd, write: OwnedFd) -> Self {
        Self { read, write }
    }

    fn into_ends(self) -> (OwnedFd, OwnedFd) {
        (self.read, self.write)
    }
}

/// Source of fresh channels
pub trait PipeFactory {
    fn open_channel(&mut self, kind: ChannelKind) -> nix::Result<Channel>;
}

/// Opens channels with pipe(2)
///
/// Both descriptors are close-on-exec. The shell only receives its ends
/// through the explicit stdio wiring at spawn time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPipes;

impl PipeFactory for SystemPipes {
    fn open_channel(&mut self, kind: ChannelKind) -> nix::Result<Channel> {
        let (read, write) = cloexec_pipe()?;
        debug!(
            "{} pipe: read={} write={}",
            kind,
            read.as_raw_fd(),
            write.as_raw_fd()
        );
        Ok(Channel::new(read, write))
    }
}

// Flag set atomically so a concurrent fork never inherits the ends
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe()?;
    set_cloexec(read.as_fd())?;
    set_cloexec(write.as_fd())?;
    Ok((read, write))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn set_cloexec(fd: BorrowedFd<'_>) -> nix::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Put a descriptor into non-blocking mode
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// The three channels of one shell
#[derive(Debug)]
pub struct PipeSet {
    pub input: Channel,
    pub output: Channel,
    pub error: Channel,
}

impl PipeSet {
    /// Open input, output and error channels in that order.
    ///
    /// If any open fails, the channels opened before it are closed and the
    /// failure is reported as [`BridgeError::ChannelCreationFailed`].
    pub fn open(factory: &mut dyn PipeFactory) -> Result<Self> {
        let input = open_one(factory, ChannelKind::Input, 0)?;
        let output = open_one(factory, ChannelKind::Output, 1)?;
        let error = open_one(factory, ChannelKind::Error, 2)?;
        Ok(Self {
            input,
            output,
            error,
        })
    }

    /// Separate the GUI-facing ends from the ends the shell inherits.
    ///
    /// GUI-facing ends are switched to non-blocking mode so that neither a
    /// stray read nor a command write can stall the event loop.
    pub fn split(self) -> (BridgeEnds, ShellEnds) {
        let (stdin, input_write) = self.input.into_ends();
        let (output_read, stdout) = self.output.into_ends();
        let (error_read, stderr) = self.error.into_ends();

        for (kind, fd) in [
            (ChannelKind::Input, input_write.as_fd()),
            (ChannelKind::Output, output_read.as_fd()),
            (ChannelKind::Error, error_read.as_fd()),
        ] {
            if let Err(e) = set_nonblocking(fd) {
                warn!("Could not make {} end non-blocking: {}", kind, e);
            }
        }

        (
            BridgeEnds {
                input: File::from(input_write),
                output: File::from(output_read),
                error: File::from(error_read),
            },
            ShellEnds {
                stdin,
                stdout,
                stderr,
            },
        )
    }
}

fn open_one(factory: &mut dyn PipeFactory, kind: ChannelKind, opened: usize) -> Result<Channel> {
    factory.open_channel(kind).map_err(|source| {
        error!(
            "{} pipe failed: {}; closing {} opened channel(s)",
            kind, source, opened
        );
        BridgeError::ChannelCreationFailed {
            channel: kind,
            source,
        }
    })
}

/// Ends of the channels owned by the bridge
#[derive(Debug)]
pub struct BridgeEnds {
    /// Write end of the shell-input channel
    pub input: File,
    /// Read end of the shell-output channel
    pub output: File,
    /// Read end of the shell-error channel
    pub error: File,
}

/// Ends of the channels handed to the shell
#[derive(Debug)]
pub struct ShellEnds {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// Point descriptors 0, 1 and 2 of this process at the shell ends.
///
/// Affects every subprocess spawned afterwards, not only the shell.
pub fn redirect_std_streams(ends: &ShellEnds) -> Result<()> {
    for (kind, fd) in [
        (ChannelKind::Input, &ends.stdin),
        (ChannelKind::Output, &ends.stdout),
        (ChannelKind::Error, &ends.stderr),
    ] {
        let slot = kind.std_slot();
        dup2(fd.as_raw_fd(), slot).map_err(|source| BridgeError::RedirectFailed { slot, source })?;
    }
    Ok(())
}

/// Duplicates of descriptors 0, 1 and 2 taken before a redirect
#[derive(Debug)]
pub struct SavedStdStreams {
    fds: [OwnedFd; 3],
}

impl SavedStdStreams {
    pub fn save() -> io::Result<Self> {
        Ok(Self {
            fds: [
                io::stdin().as_fd().try_clone_to_owned()?,
                io::stdout().as_fd().try_clone_to_owned()?,
                io::stderr().as_fd().try_clone_to_owned()?,
            ],
        })
    }

    /// Put the saved descriptors back on slots 0, 1 and 2
    pub fn restore(self) -> Result<()> {
        let _ = io::Write::flush(&mut io::stdout());
        for (kind, fd) in [ChannelKind::Input, ChannelKind::Output, ChannelKind::Error]
            .into_iter()
            .zip(&self.fds)
        {
            let slot = kind.std_slot();
            dup2(fd.as_raw_fd(), slot).map_err(|source| BridgeError::RedirectFailed { slot, source })?;
        }
        Ok(())
    }
}

/// Return true if the descriptor has data to be read right now.
///
/// Zero timeout: this asks "is there data", it never waits for it.
pub fn has_input(fd: BorrowedFd<'_>) -> nix::Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ready = poll(&mut fds, PollTimeout::ZERO)?;
    if ready == 0 {
        return Ok(false);
    }
    Ok(fds[0]
        .revents()
        .map_or(false, |revents| revents.contains(PollFlags::POLLIN)))
}

/// A readable stream the output poller can drain
pub trait StreamSource {
    /// Non-blocking readiness check
    fn has_input(&self) -> nix::Result<bool>;

    /// One read into `buf`
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl StreamSource for File {
    fn has_input(&self) -> nix::Result<bool> {
        has_input(self.as_fd())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nix::errno::Errno;
    use nix::fcntl::FdFlag;
    use std::io::Write;
    use std::process::Command;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that move descriptors 0, 1 and 2 of the test process
    static STD_STREAMS: Mutex<()> = Mutex::new(());

    pub(crate) fn lock_std_streams() -> MutexGuard<'static, ()> {
        STD_STREAMS.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Factory that fails on the n-th open (0-based)
    pub(crate) struct FailingPipes {
        pub fail_at: usize,
        pub opened: usize,
    }

    impl PipeFactory for FailingPipes {
        fn open_channel(&mut self, kind: ChannelKind) -> nix::Result<Channel> {
            if self.opened == self.fail_at {
                return Err(Errno::EMFILE);
            }
            self.opened += 1;
            SystemPipes.open_channel(kind)
        }
    }

    #[test]
    fn test_pipe_set_wiring() {
        let set = PipeSet::open(&mut SystemPipes).unwrap();
        let (mut bridge, shell) = set.split();

        let mut shell_stdout = File::from(shell.stdout);
        let mut shell_stderr = File::from(shell.stderr);
        let mut shell_stdin = File::from(shell.stdin);

        shell_stdout.write_all(b"out").unwrap();
        shell_stderr.write_all(b"err").unwrap();
        bridge.input.write_all(b"cmd").unwrap();

        let mut buf = [0u8; 8];
        let n = bridge.output.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"out");
        let n = bridge.error.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"err");
        let n = shell_stdin.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"cmd");
    }

    #[test]
    fn test_has_input() {
        let (bridge, shell) = PipeSet::open(&mut SystemPipes).unwrap().split();
        assert!(!StreamSource::has_input(&bridge.output).unwrap());

        let mut shell_stdout = File::from(shell.stdout);
        shell_stdout.write_all(b"x").unwrap();
        assert!(StreamSource::has_input(&bridge.output).unwrap());
        assert!(!StreamSource::has_input(&bridge.error).unwrap());
    }

    #[test]
    fn test_bridge_ends_do_not_block() {
        let (mut bridge, _shell) = PipeSet::open(&mut SystemPipes).unwrap().split();
        let mut buf = [0u8; 8];
        let err = bridge.output.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_descriptors_close_on_exec() {
        let (bridge, shell) = PipeSet::open(&mut SystemPipes).unwrap().split();
        for raw in [
            bridge.input.as_raw_fd(),
            bridge.output.as_raw_fd(),
            shell.stdin.as_raw_fd(),
        ] {
            let flags = FdFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFD).unwrap());
            assert!(flags.contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn test_open_failure_names_channel() {
        let mut factory = FailingPipes {
            fail_at: 1,
            opened: 0,
        };
        match PipeSet::open(&mut factory) {
            Err(BridgeError::ChannelCreationFailed { channel, source }) => {
                assert_eq!(channel, ChannelKind::Output);
                assert_eq!(source, Errno::EMFILE);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert_eq!(factory.opened, 1);
    }

    /// Keeps the read end of the first channel and the write end of the
    /// second alive, then fails on the third
    struct SparingPipes {
        opened: usize,
        spare_read: Option<File>,
        spare_write: Option<File>,
    }

    impl PipeFactory for SparingPipes {
        fn open_channel(&mut self, kind: ChannelKind) -> nix::Result<Channel> {
            let channel = match self.opened {
                0 | 1 => SystemPipes.open_channel(kind)?,
                _ => return Err(Errno::ENFILE),
            };
            let spare = |fd: &OwnedFd| fd.try_clone().map(File::from).map_err(|_| Errno::EBADF);
            if self.opened == 0 {
                self.spare_read = Some(spare(&channel.read)?);
            } else {
                self.spare_write = Some(spare(&channel.write)?);
            }
            self.opened += 1;
            Ok(channel)
        }
    }

    #[test]
    fn test_open_failure_closes_opened_channels() {
        let mut factory = SparingPipes {
            opened: 0,
            spare_read: None,
            spare_write: None,
        };
        let err = PipeSet::open(&mut factory).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ChannelCreationFailed {
                channel: ChannelKind::Error,
                ..
            }
        ));

        // Input channel: its write end is gone, so the spare reader sees EOF
        let mut buf = [0u8; 4];
        let mut reader = factory.spare_read.take().unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        // Output channel: its read end is gone, so writing breaks the pipe
        let mut writer = factory.spare_write.take().unwrap();
        let err = writer.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_redirect_std_streams_rewires_slots() {
        let _lock = lock_std_streams();
        let (mut bridge, shell) = PipeSet::open(&mut SystemPipes).unwrap().split();
        bridge.input.write_all(b"hi\n").unwrap();

        let saved = SavedStdStreams::save().unwrap();
        redirect_std_streams(&shell).unwrap();
        // Inherits descriptors 0, 1 and 2 as they are now
        let status = Command::new("/bin/sh")
            .args(["-c", "read line; echo out:$line; echo err:$line >&2"])
            .status();
        saved.restore().unwrap();

        assert!(status.unwrap().success());
        drop(shell);

        let mut out = String::new();
        bridge.output.read_to_string(&mut out).unwrap();
        assert!(out.contains("out:hi\n"), "stdout pipe got {:?}", out);

        let mut err = String::new();
        bridge.error.read_to_string(&mut err).unwrap();
        assert!(err.contains("err:hi\n"), "stderr pipe got {:?}", err);
    }

    #[test]
    fn test_std_slots() {
        assert_eq!(ChannelKind::Input.std_slot(), 0);
        assert_eq!(ChannelKind::Output.std_slot(), 1);
        assert_eq!(ChannelKind::Error.std_slot(), 2);
        assert_eq!(ChannelKind::Error.to_string(), "stderr");
    }
}

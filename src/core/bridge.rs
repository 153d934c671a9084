//! Bridge controller
//!
//! A [`Bridge`] owns everything that connects one shell to the display: the
//! GUI-facing channel ends, the shell handle, the output poller, the input
//! assembler and the id of its poll timer. The event loop passes it to the
//! tick and key callbacks explicitly.

use std::process::ExitStatus;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::{BridgeError, Result};
use super::filter::EscapeMode;
use super::input::{InputAssembler, InputOutcome, KeystrokeEvent};
use super::pipe::{redirect_std_streams, BridgeEnds, PipeFactory, PipeSet, SavedStdStreams};
use super::poller::{OutputPoller, DEFAULT_BUFFER_SIZE};
use super::shell::{ShellCommand, ShellProcess, ShellSpawner};
use super::sink::DisplaySink;
use crate::scheduler::{Scheduler, TimerId};

/// Poll timer period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// User data attached to the poll timer. Not interpreted.
pub const POLL_TIMER_USER_DATA: u32 = 10;

/// Bridge settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub shell: ShellCommand,
    pub poll_interval: Duration,
    /// Poll buffer capacity, terminator included
    pub buffer_size: usize,
    pub escape_mode: EscapeMode,
    /// Also point descriptors 0/1/2 of this process at the shell ends
    /// until shutdown
    pub redirect_std_streams: bool,
    pub max_line_length: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            shell: ShellCommand::new("/bin/sh").arg("-i"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            escape_mode: EscapeMode::Fixed,
            redirect_std_streams: true,
            max_line_length: None,
        }
    }
}

pub struct Bridge {
    ends: BridgeEnds,
    shell: Box<dyn ShellProcess>,
    poller: OutputPoller,
    input: InputAssembler,
    timer: TimerId,
    exit_status: Option<ExitStatus>,
    /// Descriptors 0/1/2 as they were before the redirect
    saved_std: Option<SavedStdStreams>,
}

impl Bridge {
    /// Wire the pipes, spawn the shell and register the poll timer.
    ///
    /// Nothing is spawned or registered if the pipes cannot be opened, and
    /// nothing is registered if the shell cannot be spawned. Every channel
    /// opened before a failure is closed, and redirected descriptors 0/1/2
    /// are put back.
    pub fn start(
        config: &BridgeConfig,
        pipes: &mut dyn PipeFactory,
        spawner: &dyn ShellSpawner,
        scheduler: &mut dyn Scheduler,
    ) -> Result<Self> {
        info!("Starting bridge for {}", config.shell.program);

        let (ends, shell_ends) = PipeSet::open(pipes)?.split();

        let mut saved_std = None;
        if config.redirect_std_streams {
            let saved = SavedStdStreams::save().map_err(|source| {
                let e = BridgeError::SaveStdStreamsFailed(source);
                error!("{}", e);
                e
            })?;
            if let Err(e) = redirect_std_streams(&shell_ends) {
                error!("{}", e);
                restore_std_streams(saved);
                return Err(e);
            }
            debug!("standard descriptors redirected to shell pipes");
            saved_std = Some(saved);
        }

        let shell = match spawner.spawn(&config.shell, shell_ends) {
            Ok(shell) => shell,
            Err(source) => {
                let e = BridgeError::SubprocessSpawnFailed {
                    program: config.shell.program.clone(),
                    source,
                };
                error!("{}", e);
                if let Some(saved) = saved_std {
                    restore_std_streams(saved);
                }
                return Err(e);
            }
        };
        info!("pid={}", shell.id());

        let timer = scheduler.register_periodic(config.poll_interval, POLL_TIMER_USER_DATA);
        debug!("poll timer {:?} every {:?}", timer, config.poll_interval);

        Ok(Self {
            ends,
            shell,
            poller: OutputPoller::new(config.buffer_size, config.escape_mode),
            input: InputAssembler::new(config.max_line_length),
            timer,
            exit_status: None,
            saved_std,
        })
    }

    /// Id of the poll timer; fire [`Bridge::on_tick`] when it comes due
    pub fn timer_id(&self) -> TimerId {
        self.timer
    }

    pub fn pid(&self) -> u32 {
        self.shell.id()
    }

    /// Poll timer callback. Returns the number of bytes appended to `sink`.
    pub fn on_tick(&mut self, sink: &mut dyn DisplaySink) -> usize {
        let ends = &mut self.ends;
        self.poller.tick(&mut ends.output, &mut ends.error, sink)
    }

    /// Keyboard callback
    pub fn on_key(&mut self, event: &KeystrokeEvent, sink: &mut dyn DisplaySink) -> InputOutcome {
        self.input.handle_event(event, &mut self.ends.input, sink)
    }

    #[cfg(test)]
    pub fn pending_line(&self) -> &[u8] {
        self.input.pending()
    }

    /// Report the shell's exit status the first time it is seen
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_some() {
            return None;
        }
        match self.shell.try_wait() {
            Ok(Some(status)) => {
                info!("Shell {} exited: {}", self.shell.id(), status);
                self.exit_status = Some(status);
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not query shell status: {}", e);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Stop polling, close the channel ends and reap the shell
    pub fn shutdown(self, scheduler: &mut dyn Scheduler) {
        let Self {
            ends,
            mut shell,
            timer,
            exit_status,
            saved_std,
            ..
        } = self;

        if !scheduler.deregister(timer) {
            debug!("poll timer {:?} was not registered", timer);
        }

        // Closing the input end hands the shell an EOF
        drop(ends);
        if let Some(saved) = saved_std {
            restore_std_streams(saved);
        }

        if exit_status.is_none() {
            match shell.try_wait() {
                Ok(Some(status)) => info!("Shell {} exited: {}", shell.id(), status),
                Ok(None) => match shell.terminate() {
                    Ok(()) => info!("Shell {} terminated", shell.id()),
                    Err(e) => warn!("Could not terminate shell {}: {}", shell.id(), e),
                },
                Err(e) => warn!("Could not query shell status: {}", e),
            }
        }
        info!("Bridge shut down");
    }
}

fn restore_std_streams(saved: SavedStdStreams) {
    match saved.restore() {
        Ok(()) => debug!("standard descriptors restored"),
        Err(e) => warn!("{}", e),
    }
}

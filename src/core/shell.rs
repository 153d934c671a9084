//! Shell subprocess
//!
//! The shell runs as its own process. It sees the shell-side channel ends
//! as its stdin, stdout and stderr and nothing else of the bridge.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use super::pipe::ShellEnds;

/// Program, arguments and environment of the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Handle to a running shell
pub trait ShellProcess {
    fn id(&self) -> u32;

    /// Exit status if the shell has exited, without waiting
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Kill the shell and reap it
    fn terminate(&mut self) -> io::Result<()>;
}

impl ShellProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.kill()?;
        self.wait()?;
        Ok(())
    }
}

/// Starts the shell with its stdio wired to the given channel ends
pub trait ShellSpawner {
    fn spawn(&self, command: &ShellCommand, ends: ShellEnds) -> io::Result<Box<dyn ShellProcess>>;
}

/// Spawns the shell as an OS process
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandSpawner;

impl ShellSpawner for CommandSpawner {
    fn spawn(&self, command: &ShellCommand, ends: ShellEnds) -> io::Result<Box<dyn ShellProcess>> {
        debug!("spawn {} {:?}", command.program, command.args);
        // The Command owns the shell ends and closes them once it is dropped
        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::from(ends.stdin))
            .stdout(Stdio::from(ends.stdout))
            .stderr(Stdio::from(ends.stderr))
            .spawn()?;
        Ok(Box::new(child))
    }
}

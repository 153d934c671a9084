//! Shell bridge components.
//!
//! - **pipe**: the three channels between the bridge and the shell
//! - **shell**: spawning the shell process on the shell-side channel ends
//! - **poller**: non-blocking drain of shell stdout/stderr on every tick
//! - **filter**: escape code removal before display
//! - **input**: command line assembly from keyboard tokens
//! - **bridge**: the controller owning all of the above
//!
//! # Architecture
//!
//! ```text
//! Bridge
//! ├── BridgeEnds (stdin write, stdout read, stderr read)
//! ├── ShellProcess (shell with stdin read, stdout write, stderr write)
//! ├── OutputPoller ── EscapeFilter ──> DisplaySink::append_output
//! └── InputAssembler ── commit ──> shell stdin
//! ```

pub mod bridge;
pub mod error;
pub mod filter;
pub mod hexdump;
pub mod input;
pub mod pipe;
pub mod poller;
pub mod shell;
pub mod sink;

pub use bridge::{Bridge, BridgeConfig};
pub use filter::EscapeMode;
pub use input::KeystrokeEvent;
pub use pipe::SystemPipes;
pub use shell::{CommandSpawner, ShellCommand};
pub use sink::DisplaySink;

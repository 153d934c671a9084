//! Bridge error types

use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

use super::pipe::ChannelKind;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to create {channel} channel: {source}")]
    ChannelCreationFailed {
        channel: ChannelKind,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to redirect standard descriptor {slot}: {source}")]
    RedirectFailed {
        slot: RawFd,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to save standard descriptors: {0}")]
    SaveStdStreamsFailed(#[source] io::Error),

    #[error("Failed to spawn shell `{program}`: {source}")]
    SubprocessSpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Readiness check failed on {channel} channel: {source}")]
    PollCheckFailed {
        channel: ChannelKind,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to read from {channel} channel: {source}")]
    ReadFailed {
        channel: ChannelKind,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to shell input: {0}")]
    WriteFailed(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

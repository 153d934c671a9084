//! Configuration management for pipeterm.
//!
//! Settings are read from `~/.pipeterm/config.toml`. Every key is optional:
//!
//! ```toml
//! # Shell program and arguments (default: $SHELL or /bin/sh, ["-i"])
//! shell = "/bin/sh"
//! shell_args = ["-i"]
//!
//! # TERM passed to the shell
//! term = "dumb"
//!
//! # Output polling
//! poll_interval_ms = 100
//! poll_buffer_size = 64
//!
//! # Escape filter: "fixed" (per read) or "carry" (across reads)
//! escape_filter = "fixed"
//!
//! # Point descriptors 0/1/2 of pipeterm itself at the shell pipes
//! redirect_std_streams = true
//!
//! # Longest command line accepted, in bytes (default: unlimited)
//! # max_line_length = 4096
//!
//! scrollback_lines = 1000
//! log_level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::bridge::DEFAULT_POLL_INTERVAL;
use crate::core::poller::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::core::{BridgeConfig, EscapeMode, ShellCommand};

/// Shell used when neither the config nor $SHELL names one
pub const FALLBACK_SHELL: &str = "/bin/sh";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not determine config path")]
    NoHome,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell program
    pub shell: Option<String>,
    /// Shell arguments
    pub shell_args: Vec<String>,
    /// TERM value for the shell
    pub term: String,
    /// Poll timer period
    pub poll_interval_ms: u64,
    /// Poll buffer capacity, terminator included
    pub poll_buffer_size: usize,
    pub escape_filter: EscapeMode,
    pub redirect_std_streams: bool,
    pub max_line_length: Option<usize>,
    /// Output lines kept by the view
    pub scrollback_lines: usize,
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: vec!["-i".to_string()],
            term: "dumb".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            poll_buffer_size: DEFAULT_BUFFER_SIZE,
            escape_filter: EscapeMode::Fixed,
            redirect_std_streams: true,
            max_line_length: None,
            scrollback_lines: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load the default config file, falling back to defaults
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Load a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to the default config file
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoHome)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Shell program: config, then $SHELL, then /bin/sh
    pub fn shell_program(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| FALLBACK_SHELL.to_string())
    }

    /// Settings for the bridge, with out-of-range values clamped
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut shell = ShellCommand::new(self.shell_program())
            .env("TERM", &self.term)
            .env("PIPETERM", "1");
        shell.args = self.shell_args.clone();

        BridgeConfig {
            shell,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            buffer_size: self.poll_buffer_size.max(MIN_BUFFER_SIZE),
            escape_mode: self.escape_filter,
            redirect_std_streams: self.redirect_std_streams,
            max_line_length: self.max_line_length,
        }
    }
}

/// `~/.pipeterm`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".pipeterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

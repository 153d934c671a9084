//! pipeterm - a line-oriented terminal bridged to a shell over plain pipes
//!
//! pipeterm starts a shell with its stdin, stdout and stderr connected to
//! three pipes. Shell output is polled on a timer and shown in an output
//! region; keystrokes build a command line that is sent to the shell on Enter.
//!
//! # Quick Start
//!
//! ```text
//! pipeterm                 # $SHELL -i, or /bin/sh -i
//! pipeterm -s /bin/dash    # Custom shell
//! pipeterm -i 20 -b 4096   # Poll every 20 ms with a 4 KiB buffer
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Enter | Send the line |
//! | Ctrl+V | Paste |
//! | Ctrl+Q | Quit |

mod config;
mod core;
mod scheduler;
mod ui;

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event};
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{config_dir, Config};
use crate::core::input::InputOutcome;
use crate::core::{Bridge, CommandSpawner, EscapeMode, KeystrokeEvent, SystemPipes};
use crate::scheduler::TimerQueue;
use crate::ui::{KeyAction, KeyMapper, Renderer, TerminalView};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shortest wait for key events between loop iterations
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Command line options. Unset values leave the config file alone.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    shell: Option<String>,
    interval_ms: Option<u64>,
    buffer_size: Option<usize>,
    carry: bool,
    no_redirect_stdio: bool,
    config_path: Option<PathBuf>,
    init_config: bool,
    show_help: bool,
    show_version: bool,
}

impl CliOptions {
    /// Override config values given on the command line
    fn apply(&self, config: &mut Config) {
        if let Some(ref shell) = self.shell {
            config.shell = Some(shell.clone());
        }
        if let Some(ms) = self.interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(size) = self.buffer_size {
            config.poll_buffer_size = size;
        }
        if self.carry {
            config.escape_filter = EscapeMode::Carry;
        }
        if self.no_redirect_stdio {
            config.redirect_std_streams = false;
        }
    }
}

fn print_version() {
    eprintln!("pipeterm {}", VERSION);
}

fn print_help() {
    eprintln!("pipeterm {} - A shell terminal over plain pipes", VERSION);
    eprintln!();
    eprintln!("Usage: pipeterm [OPTIONS]");
    eprintln!();
    eprintln!("Shell options:");
    eprintln!("  (default)             From config.toml, $SHELL, or /bin/sh");
    eprintln!("  -s, --shell <CMD>     Shell program");
    eprintln!();
    eprintln!("Polling options:");
    eprintln!("  -i, --interval <MS>   Output poll period (default: 100)");
    eprintln!("  -b, --buffer <BYTES>  Poll buffer size (default: 64)");
    eprintln!("  --carry               Remove escape codes split across reads");
    eprintln!("  --no-redirect-stdio   Keep pipeterm's own stdio off the shell pipes");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -c, --config <PATH>   Read this config file");
    eprintln!("  --init-config         Write the current settings to ~/.pipeterm/config.toml");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                 Send the line to the shell");
    eprintln!("  Ctrl+V                Paste clipboard text");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Configuration: ~/.pipeterm/config.toml");
    eprintln!("Log file: ~/.pipeterm/pipeterm.log (level from RUST_LOG or log_level)");
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => options.show_help = true,
            "-v" | "--version" => options.show_version = true,
            "-s" | "--shell" => {
                options.shell = Some(next_value(args, &mut i, "shell")?.to_string());
            }
            "-i" | "--interval" => {
                let value = next_value(args, &mut i, "interval")?;
                let ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid interval: {}", value))?;
                if ms == 0 {
                    return Err("Interval must be at least 1 ms".to_string());
                }
                options.interval_ms = Some(ms);
            }
            "-b" | "--buffer" => {
                let value = next_value(args, &mut i, "buffer")?;
                let size = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid buffer size: {}", value))?;
                options.buffer_size = Some(size);
            }
            "--carry" => options.carry = true,
            "--no-redirect-stdio" => options.no_redirect_stdio = true,
            "-c" | "--config" => {
                options.config_path = Some(PathBuf::from(next_value(args, &mut i, "config")?));
            }
            "--init-config" => options.init_config = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn next_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing {} argument", what))
}

/// Log to ~/.pipeterm/pipeterm.log; the terminal itself belongs to the UI
fn init_logging(level: &str) {
    let log_path = config_dir()
        .map(|dir| dir.join("pipeterm.log"))
        .unwrap_or_else(|| PathBuf::from("pipeterm.log"));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if options.show_help {
        print_help();
        return Ok(());
    }
    if options.show_version {
        print_version();
        return Ok(());
    }

    let mut config = match options.config_path {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load(),
    };
    options.apply(&mut config);

    if options.init_config {
        let path = config.save().context("Failed to write config")?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    init_logging(&config.log_level);
    info!("pipeterm {} starting", VERSION);

    run_terminal(&config)
}

fn run_terminal(config: &Config) -> anyhow::Result<()> {
    let bridge_config = config.bridge_config();
    info!("Shell: {} {:?}", bridge_config.shell.program, bridge_config.shell.args);
    info!(
        "Polling every {:?} with {} byte buffer ({:?} escape filter)",
        bridge_config.poll_interval, bridge_config.buffer_size, bridge_config.escape_mode
    );

    // stdout becomes a shell pipe once the bridge starts
    let mut renderer = if bridge_config.redirect_std_streams {
        Renderer::to_tty().context("Failed to open /dev/tty")?
    } else {
        Renderer::new()
    };

    let mut timers = TimerQueue::new();
    let mut bridge = Bridge::start(&bridge_config, &mut SystemPipes, &CommandSpawner, &mut timers)
        .context("Failed to start shell")?;

    let mut view = TerminalView::new(config.scrollback_lines);
    view.set_status(format!(
        "{} (pid {}) | Enter: send | Ctrl+V: paste | Ctrl+Q: quit",
        bridge_config.shell.program,
        bridge.pid()
    ));

    let result = match renderer.init() {
        Ok(()) => run_main_loop(&mut bridge, &mut timers, &mut view, &mut renderer),
        Err(e) => Err(anyhow::Error::from(e).context("Failed to initialize terminal")),
    };

    let _ = renderer.cleanup();
    bridge.shutdown(&mut timers);
    info!("pipeterm exiting");

    result
}

fn run_main_loop(
    bridge: &mut Bridge,
    timers: &mut TimerQueue,
    view: &mut TerminalView,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    loop {
        for timer in timers.handle(Instant::now()) {
            trace!("timer {:?} fired, user data {}", timer.id, timer.user_data);
            if timer.id == bridge.timer_id() {
                bridge.on_tick(view);
            }
        }

        if let Some(status) = bridge.poll_exit() {
            view.set_status(format!("Shell exited ({}) | Ctrl+Q: quit", status));
        }

        if view.is_dirty() {
            renderer.render(view)?;
            view.mark_clean();
        }

        let wait = timers.next_wake(Instant::now()).max(MIN_WAIT);
        if !event::poll(wait)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => match KeyMapper::map(&key) {
                KeyAction::Quit => {
                    info!("Quit requested");
                    break;
                }
                KeyAction::Keys(events) => send_keys(bridge, view, &events),
                KeyAction::Paste => match clipboard_text() {
                    Some(text) => send_keys(bridge, view, &KeyMapper::paste(&text)),
                    None => view.set_status("Clipboard is empty or unavailable"),
                },
                KeyAction::None => {}
            },
            Event::FocusGained => send_keys(bridge, view, &[KeystrokeEvent::focus(true)]),
            Event::FocusLost => send_keys(bridge, view, &[KeystrokeEvent::focus(false)]),
            Event::Resize(cols, rows) => {
                debug!("Resized to {}x{}", cols, rows);
                view.mark_dirty();
            }
            _ => {}
        }
    }

    Ok(())
}

fn send_keys(bridge: &mut Bridge, view: &mut TerminalView, events: &[KeystrokeEvent]) {
    for event in events {
        match bridge.on_key(event, view) {
            InputOutcome::Rejected => view.set_status("Line too long"),
            InputOutcome::SendFailed => view.set_status("Could not write to the shell"),
            _ => {}
        }
    }
}

fn clipboard_text() -> Option<String> {
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(c) => c,
        Err(e) => {
            warn!("Clipboard unavailable: {}", e);
            return None;
        }
    };
    clipboard.get_text().ok().filter(|text| !text.is_empty())
}

//! User interface rendering and input handling.
//!
//! - **view**: output lines, input field and status as the bridge sees them
//! - **renderer**: full-screen crossterm drawing of the view
//! - **keymapper**: keyboard input to keystroke token mapping

pub mod keymapper;
pub mod renderer;
pub mod view;

pub use keymapper::{KeyAction, KeyMapper};
pub use renderer::Renderer;
pub use view::TerminalView;

pub mod tmux;

use crate::error::Result;

pub use tmux::TmuxTerminal;

/// A terminal multiplexer that hosts agent sessions.
///
/// Targets are opaque strings (a tmux pane id such as `%3`).
pub trait Terminal: Send + Sync {
    /// Whether the target still exists.
    fn exists(&self, target: &str) -> bool;

    /// Type `text` into the target and press Enter.
    fn inject(&self, target: &str, text: &str) -> Result<()>;

    /// Current visible contents of the target.
    fn capture(&self, target: &str) -> Result<String>;

    /// Press a single named key (`Escape`, `C-c`, `Up`, ...).
    fn send_key(&self, target: &str, key: &str) -> Result<()>;
}

/// Keys an operator may press remotely with `/key`.
pub const ALLOWED_KEYS: &[&str] = &[
    "Enter", "Escape", "Tab", "BTab", "Up", "Down", "Left", "Right", "C-c", "C-d", "y", "n",
    "1", "2", "3",
];

pub fn is_allowed_key(key: &str) -> bool {
    ALLOWED_KEYS.contains(&key)
}

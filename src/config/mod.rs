use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Returns the global config directory path: `~/.config/hook-relay/`
pub fn dirs_global() -> PathBuf {
    PathBuf::from(home_dir()).join(".config").join("hook-relay")
}

/// Default state directory. Prefers `$XDG_STATE_HOME`, falls back to
/// `~/.local/state`.
fn default_state_dir() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home_dir()).join(".local").join("state"))
        .join("hook-relay")
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| "/tmp".into())
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Root of all persisted state. Pending requests live in `pending/`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Loopback port of the daemon's HTTP API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// How often the hook re-reads its pending request file.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Hard ceiling on how long the hook waits. Stays under the agent's own
    /// hook timeout.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_secs: u64,

    /// Timeout for the hook's best-effort signal to the daemon.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,

    /// Interval of the daemon's stale-request sweep.
    #[serde(default = "default_stale_sweep")]
    pub stale_sweep_secs: u64,

    /// Maximum characters per channel message.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Environment variable the hook reads to learn its terminal target.
    #[serde(default = "default_terminal_env")]
    pub terminal_env: String,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

fn default_http_port() -> u16 {
    8765
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_hook_timeout() -> u64 {
    110
}
fn default_notify_timeout_ms() -> u64 {
    1500
}
fn default_stale_sweep() -> u64 {
    30
}
fn default_max_message_len() -> usize {
    4096
}
fn default_terminal_env() -> String {
    "TMUX_PANE".into()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            http_port: default_http_port(),
            poll_interval_ms: default_poll_interval_ms(),
            hook_timeout_secs: default_hook_timeout(),
            notify_timeout_ms: default_notify_timeout_ms(),
            stale_sweep_secs: default_stale_sweep(),
            max_message_len: default_max_message_len(),
            terminal_env: default_terminal_env(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// Telegram bot credentials and chat routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat that receives prompts for sessions without an explicit binding.
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Chats whose messages and button presses are honoured. The default
    /// chat is always allowed.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.chat_id == Some(chat_id) || self.allowed_chat_ids.contains(&chat_id)
    }
}

impl RelayConfig {
    /// Load config from a YAML file. Returns defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| RelayError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the global config (or `$HOOK_RELAY_CONFIG`), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("HOOK_RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_global().join("config.yml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `HOOK_RELAY_*` environment overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("HOOK_RELAY_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(port) = env_parse("HOOK_RELAY_PORT") {
            self.http_port = port;
        }
        if let Some(secs) = env_parse("HOOK_RELAY_HOOK_TIMEOUT_SECS") {
            self.hook_timeout_secs = secs;
        }
        if let Some(ms) = env_parse("HOOK_RELAY_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms;
        }
        if let Ok(token) = std::env::var("HOOK_RELAY_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = env_parse("HOOK_RELAY_CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.state_dir.join("pending")
    }

    pub fn daemon_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

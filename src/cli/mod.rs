pub mod hook;
pub mod queue;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hook-relay", version, about = "Answer agent permission prompts from a chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bot daemon.
    Serve,
    /// Handle one agent hook event from stdin.
    Hook,
    /// List pending requests in the store.
    Pending,
    /// Allow a pending permission request.
    Approve {
        id: String,
        /// Apply the n-th "always allow" suggestion instead of a one-off allow.
        #[arg(long)]
        always: Option<usize>,
    },
    /// Deny a pending permission request.
    Deny {
        id: String,
        /// Reason passed back to the agent.
        #[arg(long, short)]
        message: Option<String>,
    },
    /// Bind a session's terminal to a chat.
    Bind {
        chat_id: i64,
        #[arg(long, conflicts_with_all = ["cwd", "target"])]
        session: Option<String>,
        #[arg(long, conflicts_with = "target")]
        cwd: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },
    /// Remove a terminal's chat binding.
    Unbind { target: String },
}

impl Commands {
    /// Default log filter. The hook keeps quiet so the agent's terminal
    /// isn't cluttered.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Commands::Hook => "warn",
            _ => "info",
        }
    }
}

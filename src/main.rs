use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hook_relay::cli::{self, Cli, Commands};
use hook_relay::config::RelayConfig;
use hook_relay::ipc::BindRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // stdout belongs to the agent when running as a hook.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.command.default_log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match RelayConfig::load() {
        Ok(config) => config,
        // A broken config must not block the agent.
        Err(e) if matches!(args.command, Commands::Hook) => {
            tracing::warn!(error = %e, "config unreadable; using defaults");
            let mut config = RelayConfig::default();
            config.apply_env();
            config
        }
        Err(e) => return Err(e).context("failed to load config"),
    };

    match args.command {
        Commands::Serve => cli::serve::run_serve(config).await?,
        Commands::Hook => cli::hook::run_hook(config).await?,
        Commands::Pending => cli::queue::run_pending(&config).await?,
        Commands::Approve { id, always } => cli::queue::run_approve(&config, &id, always).await?,
        Commands::Deny { id, message } => cli::queue::run_deny(&config, &id, message).await?,
        Commands::Bind {
            chat_id,
            session,
            cwd,
            target,
        } => {
            let request = BindRequest {
                chat_id,
                session_id: session,
                cwd,
                target,
            };
            cli::queue::run_bind(&config, request).await?
        }
        Commands::Unbind { target } => cli::queue::run_unbind(&config, &target).await?,
    }
    Ok(())
}

//! Long-running bot daemon: recovery, channel loop, stale sweep, HTTP API.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::{Channel, InboundEvent, TelegramChannel};
use crate::config::RelayConfig;
use crate::coordinator::Coordinator;
use crate::error::{RelayError, Result};
use crate::ipc::server;
use crate::recovery;
use crate::storage::file::FileRequestStore;
use crate::terminal::TmuxTerminal;

const INBOUND_QUEUE: usize = 256;

/// Build a coordinator over the file store, Telegram and tmux.
pub fn build(config: RelayConfig) -> Result<Coordinator> {
    let token = config
        .telegram
        .bot_token
        .clone()
        .ok_or_else(|| RelayError::Channel {
            reason: "telegram.bot_token is not configured".into(),
        })?;
    if config.telegram.chat_id.is_none() {
        tracing::warn!("telegram.chat_id is not set; only bound sessions will get prompts");
    }
    let channel = TelegramChannel::new(&token)?.with_max_message_len(config.max_message_len);
    let store = FileRequestStore::new(config.pending_dir());
    std::fs::create_dir_all(store.dir())?;
    Ok(Coordinator::new(
        config,
        Arc::new(store),
        Arc::new(channel),
        Arc::new(TmuxTerminal::new()),
    ))
}

/// Run the daemon until the HTTP listener stops.
pub async fn run(coordinator: Arc<Coordinator>) -> Result<()> {
    let port = coordinator.config().http_port;

    // Mirrors must be back before any operator input is accepted.
    let report = recovery::recover(&coordinator)?;
    let listener = server::bind_listener(port).await?;

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    coordinator.channel().start(tx).await?;
    tokio::spawn(dispatch_inbound(Arc::clone(&coordinator), rx));
    tokio::spawn(sweep_loop(Arc::clone(&coordinator)));

    recovery::resume_pending(&coordinator, report.pending);
    server::serve(coordinator, listener).await
}

/// Handle operator events in arrival order, so consecutive messages reach a
/// terminal in the order they were typed.
async fn dispatch_inbound(coordinator: Arc<Coordinator>, mut rx: mpsc::Receiver<InboundEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = coordinator.handle_inbound(event).await {
            tracing::warn!(error = %e, "inbound event failed");
        }
    }
    tracing::warn!("inbound channel closed");
}

async fn sweep_loop(coordinator: Arc<Coordinator>) {
    let period = Duration::from_secs(coordinator.config().stale_sweep_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; recovery just ran.
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(e) = coordinator.sweep_stale().await {
            tracing::warn!(error = %e, "stale sweep failed");
        }
    }
}

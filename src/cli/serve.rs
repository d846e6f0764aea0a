use std::sync::Arc;

use crate::config::RelayConfig;
use crate::daemon;
use crate::error::Result;

/// Run the daemon in the foreground.
pub async fn run_serve(config: RelayConfig) -> Result<()> {
    tracing::info!(
        state_dir = %config.state_dir.display(),
        port = config.http_port,
        "starting hook-relay daemon"
    );
    let coordinator = Arc::new(daemon::build(config)?);
    daemon::run(coordinator).await
}

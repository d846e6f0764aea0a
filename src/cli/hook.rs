use tokio::io::AsyncReadExt;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::hook::{self, HookClient};

/// Read one event from stdin, run the hook protocol and print the decision.
///
/// Never fails from the agent's point of view: errors are logged to stderr
/// and stdout stays empty.
pub async fn run_hook(config: RelayConfig) -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;

    let result = match HookClient::from_config(&config) {
        Ok(client) => hook::run_hook(&client, &input, hook::terminal_target(&config)).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(Some(output)) => println!("{output}"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "hook failed; leaving the decision to the agent"),
    }
    Ok(())
}

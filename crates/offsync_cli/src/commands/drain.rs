//! Drain command implementation.

use super::CommandResult;
use offsync_engine::{HttpTransport, OfflineClient, SyncConfig};

/// Replays pending mutations once against the configured services.
pub fn run(config: &SyncConfig) -> CommandResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let transport = HttpTransport::new(config.request_timeout)?;
        let client = OfflineClient::open(config, transport)?;
        let pending = client.queue().list_eligible()?.len();
        println!("Draining {pending} pending mutation(s)");

        let report = client.sync_now().await?;
        println!("  Completed: {}", report.completed);
        println!("  Retrying:  {}", report.retried);
        println!("  Failed:    {}", report.failed);
        if report.interrupted {
            println!("  Drain stopped early (connectivity or session lost)");
        }
        tracing::debug!(stats = ?client.engine().stats(), "drain finished");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

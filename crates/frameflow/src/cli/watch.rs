//! Watch command - rescan the source directory until interrupted.

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use crate::cli::ConfigOverrides;
use crate::ingest::IntakeController;

pub struct WatchArgs {
    pub overrides: ConfigOverrides,
    pub interval: Option<u64>,
}

pub async fn run(args: WatchArgs) -> anyhow::Result<()> {
    let mut config = args.overrides.resolve().context("Failed to build configuration")?;
    if let Some(interval) = args.interval {
        config.poll_interval_secs = interval;
    }

    let controller = IntakeController::new(config).context("Failed to start ingest pipeline")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current pass");
            let _ = shutdown_tx.send(true);
        }
    });

    controller.watch(shutdown_rx).await.context("Watch loop failed")?;
    Ok(())
}

//! Scan command - process existing render output once and exit.

use anyhow::Context;

use crate::cli::ConfigOverrides;
use crate::ingest::IntakeController;

pub struct ScanArgs {
    pub overrides: ConfigOverrides,
    pub json: bool,
}

pub async fn run(args: ScanArgs) -> anyhow::Result<()> {
    let config = args.overrides.resolve().context("Failed to build configuration")?;
    let controller = IntakeController::new(config).context("Failed to start ingest pipeline")?;
    let report = controller.scan_once().await.context("Scan pass failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "discovered {}  ingested {}  unchanged {}  deferred {}  rejected {}  ({} ms)",
            report.discovered,
            report.ingested,
            report.unchanged,
            report.deferred,
            report.rejected,
            report.duration_ms
        );
    }
    Ok(())
}

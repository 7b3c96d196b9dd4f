//! Frameflow launcher.

use clap::Parser;

use frameflow::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    frameflow_logging::init_logging(frameflow_logging::LogConfig {
        app_name: "frameflow",
        verbose: cli.verbose,
        quiet: cli.json_output(),
    })?;

    cli::run(cli).await
}

//! Command-line surface. Thin by design: parse flags, build an
//! [`IngestConfig`], dispatch into the library.

pub mod index;
pub mod scan;
pub mod watch;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, IngestConfig};

#[derive(Parser, Debug)]
#[command(name = "frameflow", about = "Render-output ingest pipeline", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Mirror the full log filter on stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process existing files once and exit
    Scan {
        #[command(flatten)]
        overrides: ConfigOverrides,
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the source directory until interrupted
    Watch {
        #[command(flatten)]
        overrides: ConfigOverrides,
        /// Rescan interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Rebuild the asset index from the destination directory
    Index {
        /// Destination asset directory
        #[arg(long)]
        target: Option<PathBuf>,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the rebuilt index as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Config-file path plus per-flag overrides shared by scan and watch.
#[derive(Args, Debug, Clone)]
pub struct ConfigOverrides {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Source directory the render tool writes into
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Destination asset directory
    #[arg(long)]
    pub target: Option<PathBuf>,
    /// Manifest document path
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// Worker pool size (0 = auto)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl ConfigOverrides {
    pub fn resolve(&self) -> Result<IngestConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::load(path)?,
            None => IngestConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source_dir = source.clone();
        }
        if let Some(target) = &self.target {
            config.target_dir = target.clone();
        }
        if let Some(manifest) = &self.manifest {
            config.manifest_path = manifest.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        Ok(config)
    }
}

impl Cli {
    /// True when the selected command writes machine-readable output to
    /// stdout; stderr logging is suppressed so the two never interleave.
    pub fn json_output(&self) -> bool {
        matches!(
            self.command,
            Commands::Scan { json: true, .. } | Commands::Index { json: true, .. }
        )
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Scan { overrides, json } => scan::run(scan::ScanArgs { overrides, json }).await,
        Commands::Watch { overrides, interval } => {
            watch::run(watch::WatchArgs { overrides, interval }).await
        }
        Commands::Index { target, config, json } => {
            index::run(index::IndexArgs { target, config, json })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_with_overrides() {
        let cli = Cli::try_parse_from([
            "frameflow", "scan", "--source", "/renders", "--target", "/assets", "--json",
        ])
        .unwrap();
        match &cli.command {
            Commands::Scan { overrides, json } => {
                assert!(*json);
                assert_eq!(overrides.source.as_deref(), Some(std::path::Path::new("/renders")));
                let config = overrides.resolve().unwrap();
                assert_eq!(config.source_dir, PathBuf::from("/renders"));
                assert_eq!(config.target_dir, PathBuf::from("/assets"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(cli.json_output());
    }

    #[test]
    fn parses_watch_interval() {
        let cli = Cli::try_parse_from(["frameflow", "watch", "--interval", "30"]).unwrap();
        match &cli.command {
            Commands::Watch { interval, .. } => assert_eq!(*interval, Some(30)),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.json_output());
    }
}

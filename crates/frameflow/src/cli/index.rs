//! Index command - rebuild the asset index without running a scan.

use std::path::PathBuf;

use anyhow::Context;

use crate::config::IngestConfig;
use crate::ingest::AssetIndexBuilder;

pub struct IndexArgs {
    pub target: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

pub fn run(args: IndexArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::load(path).context("Failed to load configuration")?,
        None => IngestConfig::default(),
    };
    if let Some(target) = args.target {
        config.target_dir = target;
    }

    let builder = AssetIndexBuilder::new(
        config.target_dir.clone(),
        config.index_filename.clone(),
        config.web_prefix.clone(),
        config.video_extensions.clone(),
    );
    let index = builder.rebuild().context("Index rebuild failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
    } else {
        println!("indexed {} videos -> {}", index.count, builder.index_path().display());
    }
    Ok(())
}

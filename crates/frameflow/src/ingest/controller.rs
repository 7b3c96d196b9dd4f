//! Intake controller: drives candidate files through the ingest pipeline.
//!
//! Candidates come from directory scans (polling, not inotify - notification
//! APIs are unreliable on the network filesystems render farms like to mount).
//! Each candidate runs the same strictly sequential pipeline: stabilize size,
//! validate, hash, gate on the manifest, copy, stage. Candidates are
//! independent, so a batch processes them in parallel under a semaphore cap;
//! the batch manifest commit is the single point where results converge.
//! Workers never write the manifest themselves.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::hashing::{ContentHasher, HashError};
use crate::ingest::copier::AssetCopier;
use crate::ingest::error::{IngestError, ProcessingError};
use crate::ingest::index::AssetIndexBuilder;
use crate::ingest::types::{
    quality_label_of, scene_name_of, BatchReport, FileOutcome, RejectReason,
};
use crate::manifest::{Manifest, ManifestEntry};
use crate::probe::{FfprobeProbe, MetadataProbe, NullProbe, ProbeMetadata};
use frameflow_security::{AccessMode, PathSandbox};

/// Immutable pipeline context shared by all worker tasks.
struct Shared {
    config: IngestConfig,
    source_root: PathBuf,
    sandbox: PathSandbox,
    hasher: ContentHasher,
    manifest: Manifest,
    copier: AssetCopier,
    probe: Box<dyn MetadataProbe>,
}

/// Orchestrates discovery, per-file pipelines, and batch commits.
pub struct IntakeController {
    shared: Arc<Shared>,
    index: Arc<AssetIndexBuilder>,
}

impl IntakeController {
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        config.validate()?;
        fs::create_dir_all(&config.target_dir)?;

        let source_root = fs::canonicalize(&config.source_dir)?;
        let target_root = fs::canonicalize(&config.target_dir)?;

        let mut roots = vec![source_root.clone(), target_root.clone()];
        roots.extend(config.extra_roots.iter().cloned());
        let sandbox = PathSandbox::new(roots)?;

        let hasher = ContentHasher::new(
            config.hash_algorithm,
            config.chunk_size,
            config.mmap_threshold,
        );
        let manifest = Manifest::new(config.manifest_path.clone());
        let copier = AssetCopier::new(target_root.clone(), sandbox.clone());
        let index = Arc::new(AssetIndexBuilder::new(
            target_root,
            config.index_filename.clone(),
            config.web_prefix.clone(),
            config.video_extensions.clone(),
        ));
        let probe: Box<dyn MetadataProbe> = if config.probe_enabled {
            Box::new(FfprobeProbe::default())
        } else {
            Box::new(NullProbe)
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                source_root,
                sandbox,
                hasher,
                manifest,
                copier,
                probe,
            }),
            index,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.shared.manifest
    }

    /// One pass: enumerate the source tree, process every candidate, commit
    /// the batch, rebuild the index.
    pub async fn scan_once(&self) -> Result<BatchReport, IngestError> {
        let started = Instant::now();
        let candidates = self.discover().await?;
        let mut report = self.process_batch(candidates).await?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            discovered = report.discovered,
            ingested = report.ingested,
            unchanged = report.unchanged,
            deferred = report.deferred,
            rejected = report.rejected,
            duration_ms = report.duration_ms,
            "scan pass complete"
        );
        Ok(report)
    }

    /// Rescan on a fixed interval until `shutdown` flips or closes.
    ///
    /// The first tick fires immediately, so watch mode catches up on files
    /// that arrived while the pipeline was down. Cancellation stops
    /// scheduling new passes within one interval; it does not abort a pass in
    /// flight. A failed batch commit is logged and the loop keeps going -
    /// the uncommitted files reprocess harmlessly on a later pass.
    pub async fn watch(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), IngestError> {
        let period = Duration::from_secs(self.shared.config.poll_interval_secs);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "watch mode started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("watch mode stopping");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "scan pass failed; affected files will be reprocessed");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Enumerate candidate files under the source root.
    async fn discover(&self) -> Result<Vec<PathBuf>, IngestError> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&shared.source_root).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "walk error, skipping entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if shared.config.is_video(path) && !shared.config.is_excluded(path) {
                    found.push(path.to_path_buf());
                }
            }
            found
        })
        .await
        .map_err(join_failure)
    }

    /// Run every candidate through its pipeline, then commit staged entries
    /// in one manifest write and rebuild the index once.
    async fn process_batch(&self, candidates: Vec<PathBuf>) -> Result<BatchReport, IngestError> {
        let mut report = BatchReport {
            discovered: candidates.len() as u64,
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let limiter = Arc::new(Semaphore::new(self.shared.config.effective_in_flight()));
        let mut tasks = JoinSet::new();
        for path in candidates {
            let shared = Arc::clone(&self.shared);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .expect("in-flight limiter closed");
                process_candidate(shared, path).await
            });
        }

        let mut staged: HashMap<String, ManifestEntry> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "candidate task failed");
                    report.rejected += 1;
                    continue;
                }
            };
            match outcome {
                FileOutcome::Recorded { key, entry } => {
                    report.ingested += 1;
                    staged.insert(key, entry);
                }
                FileOutcome::Unchanged { .. } => report.unchanged += 1,
                FileOutcome::Deferred { path } => {
                    debug!(path = %path.display(), "size not stable, deferred");
                    report.deferred += 1;
                }
                FileOutcome::Rejected { path, reason } => {
                    warn!(path = %path.display(), %reason, "candidate rejected");
                    report.rejected += 1;
                }
            }
        }

        if !staged.is_empty() {
            let shared = Arc::clone(&self.shared);
            tokio::task::spawn_blocking(move || shared.manifest.batch_update(staged))
                .await
                .map_err(join_failure)??;

            let index = Arc::clone(&self.index);
            tokio::task::spawn_blocking(move || index.rebuild())
                .await
                .map_err(join_failure)??;
            report.index_rebuilt = true;
        }
        Ok(report)
    }
}

/// One candidate's pipeline. Infallible by construction: every failure folds
/// into a terminal [`FileOutcome`] so no single file can abort the batch.
async fn process_candidate(shared: Arc<Shared>, path: PathBuf) -> FileOutcome {
    // Discovered -> SizeStabilizing
    let settle = Duration::from_millis(shared.config.settle_ms);
    let size_bytes = match stabilized_size(&path, settle).await {
        Ok(Some(size)) => size,
        Ok(None) => return FileOutcome::Deferred { path },
        Err(e) => {
            return FileOutcome::Rejected {
                path,
                reason: RejectReason::Processing(e),
            }
        }
    };

    // -> Validated
    if !shared.config.is_video(&path) {
        return FileOutcome::Rejected {
            path,
            reason: RejectReason::Filtered("unsupported extension"),
        };
    }
    if shared.config.is_excluded(&path) {
        return FileOutcome::Rejected {
            path,
            reason: RejectReason::Filtered("excluded path pattern"),
        };
    }
    let resolved = match shared.sandbox.validate(&path, AccessMode::Input) {
        Ok(resolved) => resolved,
        Err(v) => {
            return FileOutcome::Rejected {
                path,
                reason: RejectReason::Security(v),
            }
        }
    };

    // -> Hashed
    let digest = {
        let shared = Arc::clone(&shared);
        let target = resolved.clone();
        match tokio::task::spawn_blocking(move || shared.hasher.fingerprint(&target)).await {
            Ok(Ok(digest)) => digest,
            Ok(Err(e)) => {
                return FileOutcome::Rejected {
                    path: resolved,
                    reason: RejectReason::Processing(ProcessingError::Hash(e)),
                }
            }
            Err(e) => {
                return FileOutcome::Rejected {
                    path: resolved,
                    reason: RejectReason::Processing(ProcessingError::Hash(HashError::Io(
                        io::Error::new(io::ErrorKind::Other, e),
                    ))),
                }
            }
        }
    };

    let key = resolved.to_string_lossy().into_owned();
    if !shared.manifest.needs_processing(&key, &digest) {
        return FileOutcome::Unchanged { path: resolved };
    }

    // -> Copying
    let scene_name = scene_name_of(&resolved);
    let quality_label = quality_label_of(&resolved, &shared.source_root);
    let destination = {
        let shared_copy = Arc::clone(&shared);
        let source = resolved.clone();
        let scene = scene_name.clone();
        let quality = quality_label.clone();
        match tokio::task::spawn_blocking(move || shared_copy.copier.copy(&source, &scene, &quality))
            .await
        {
            Ok(Ok(destination)) => destination,
            Ok(Err(e)) => {
                return FileOutcome::Rejected {
                    path: resolved,
                    reason: RejectReason::Processing(e),
                }
            }
            Err(e) => {
                return FileOutcome::Rejected {
                    path: resolved,
                    reason: RejectReason::Processing(ProcessingError::Copy(io::Error::new(
                        io::ErrorKind::Other,
                        e,
                    ))),
                }
            }
        }
    };

    let metadata = probe_metadata(&shared, &destination).await;

    // -> Recorded (staged; the controller commits the batch)
    FileOutcome::Recorded {
        key,
        entry: ManifestEntry {
            content_hash: digest.hex,
            hash_algorithm: digest.algorithm,
            destination_path: destination.to_string_lossy().into_owned(),
            processed_at: Utc::now(),
            scene_name,
            quality_label,
            size_bytes,
            duration_seconds: metadata.duration_seconds,
            resolution: metadata.resolution,
            codec: metadata.codec,
            extra: HashMap::new(),
        },
    }
}

/// Best-effort probe of the published asset. Failures degrade to absent
/// metadata.
async fn probe_metadata(shared: &Arc<Shared>, destination: &Path) -> ProbeMetadata {
    if !shared.config.probe_enabled {
        return ProbeMetadata::default();
    }
    let shared = Arc::clone(shared);
    let target = destination.to_path_buf();
    match tokio::task::spawn_blocking(move || shared.probe.probe(&target)).await {
        Ok(Ok(metadata)) => metadata,
        Ok(Err(e)) => {
            debug!(error = %e, "metadata probe failed");
            ProbeMetadata::default()
        }
        Err(e) => {
            debug!(error = %e, "metadata probe task failed");
            ProbeMetadata::default()
        }
    }
}

/// Sample the file size, wait out the settle interval, and re-sample.
///
/// `Ok(None)` means the file grew or shrank in the window - still being
/// written, try again next pass. Best-effort by design: a writer that pauses
/// longer than the settle window will be misjudged stable; the copy still
/// never exposes a partial file at the final destination name.
async fn stabilized_size(path: &Path, settle: Duration) -> Result<Option<u64>, ProcessingError> {
    let before = file_size(path)?;
    tokio::time::sleep(settle).await;
    let after = file_size(path)?;
    Ok((before == after).then_some(after))
}

fn file_size(path: &Path) -> Result<u64, ProcessingError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProcessingError::SourceVanished),
        Err(e) => Err(ProcessingError::Stat(e)),
    }
}

fn join_failure(e: JoinError) -> IngestError {
    IngestError::Io(io::Error::new(io::ErrorKind::Other, e))
}

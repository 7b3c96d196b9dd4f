//! Durable ingest manifest: source path -> last-processed record.
//!
//! The manifest is one JSON object on disk with an in-memory cache. Writes go
//! through a temp sibling plus atomic rename, so a reader never observes a
//! partially written document and a crash mid-write leaves the previous file
//! intact. A corrupt manifest is not an error: the bad file is quarantined
//! with a timestamped suffix and the pipeline restarts from an empty map,
//! trading historical continuity for availability.
//!
//! Concurrency guarantee: all mutation inside one process is serialized by an
//! instance mutex. Cross-process writers additionally contend on a best-effort
//! `fs2` advisory lock on a sibling `.lock` file held across the
//! read-modify-write window; processes that bypass this discipline can still
//! lose updates, which is why external tools are told to treat the file as
//! read-only.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::hashing::{HashAlgorithm, HashDigest};

/// Suffix stem for quarantined corrupt manifests.
const QUARANTINE_SUFFIX: &str = "corrupt";

/// Persistence failure. Parse corruption is deliberately NOT represented
/// here - it self-heals inside [`Manifest::read`].
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One successfully processed source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Hex digest of the source content at processing time.
    pub content_hash: String,
    /// Algorithm that produced `content_hash`. Entries written before this
    /// field existed default to blake3, the only algorithm those builds had.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// Absolute destination path the asset was published to.
    pub destination_path: String,
    /// When the copy was recorded.
    pub processed_at: DateTime<Utc>,
    /// Scene name derived from the filename stem.
    pub scene_name: String,
    /// Quality label derived from the parent directory, or "unknown".
    pub quality_label: String,
    /// Source size in bytes at processing time.
    pub size_bytes: u64,
    /// Probe metadata; absent when probing is disabled or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Open-ended extra metadata. Explicit map rather than free-form fields
    /// merged into the record.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ManifestEntry {
    /// True when `digest` matches what this entry recorded, algorithm
    /// included. An algorithm mismatch means the stored digest cannot vouch
    /// for the current content.
    pub fn matches(&self, digest: &HashDigest) -> bool {
        self.hash_algorithm == digest.algorithm && self.content_hash == digest.hex
    }
}

/// The durable source-path -> entry map.
pub struct Manifest {
    path: PathBuf,
    cache: Mutex<Option<HashMap<String, ManifestEntry>>>,
}

impl Manifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current manifest contents. Loads and caches on first call; a corrupt
    /// on-disk file is quarantined and replaced by an empty map rather than
    /// surfacing an error.
    pub fn read(&self) -> HashMap<String, ManifestEntry> {
        let mut cache = self.cache.lock().expect("manifest cache lock poisoned");
        self.loaded(&mut cache).clone()
    }

    /// Single source of truth for "is this file new or changed".
    pub fn needs_processing(&self, key: &str, digest: &HashDigest) -> bool {
        let mut cache = self.cache.lock().expect("manifest cache lock poisoned");
        match self.loaded(&mut cache).get(key) {
            Some(entry) => !entry.matches(digest),
            None => true,
        }
    }

    /// Insert or replace a single entry and persist.
    ///
    /// Prefer [`Manifest::batch_update`] for multiple entries; each call here
    /// pays a full serialize + fsync + rename.
    pub fn add_entry(&self, key: &str, entry: ManifestEntry) -> Result<(), ManifestError> {
        let mut cache = self.cache.lock().expect("manifest cache lock poisoned");
        let mut map = self.loaded(&mut cache).clone();
        map.insert(key.to_string(), entry);
        self.persist(&map)?;
        *cache = Some(map);
        Ok(())
    }

    /// Merge a batch of entries in one read-modify-write cycle.
    ///
    /// Returns the number of entries merged.
    pub fn batch_update(
        &self,
        entries: HashMap<String, ManifestEntry>,
    ) -> Result<usize, ManifestError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let count = entries.len();
        let mut cache = self.cache.lock().expect("manifest cache lock poisoned");
        let mut map = self.loaded(&mut cache).clone();
        map.extend(entries);
        self.persist(&map)?;
        *cache = Some(map);
        Ok(count)
    }

    /// Replace the entire manifest with `map`.
    pub fn write(&self, map: HashMap<String, ManifestEntry>) -> Result<(), ManifestError> {
        let mut cache = self.cache.lock().expect("manifest cache lock poisoned");
        self.persist(&map)?;
        *cache = Some(map);
        Ok(())
    }

    /// Return the cached map, loading from disk if the cache is cold.
    fn loaded<'a>(
        &self,
        cache: &'a mut Option<HashMap<String, ManifestEntry>>,
    ) -> &'a mut HashMap<String, ManifestEntry> {
        if cache.is_none() {
            *cache = Some(self.load_from_disk());
        }
        cache.as_mut().expect("cache populated above")
    }

    fn load_from_disk(&self) -> HashMap<String, ManifestEntry> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(error = %e, manifest = %self.path.display(), "manifest unreadable, starting empty");
                return HashMap::new();
            }
        };

        match serde_json::from_slice::<HashMap<String, ManifestEntry>>(&bytes) {
            Ok(map) => {
                debug!(entries = map.len(), "manifest loaded");
                map
            }
            Err(e) => {
                warn!(error = %e, manifest = %self.path.display(), "manifest corrupt, quarantining");
                self.quarantine();
                HashMap::new()
            }
        }
    }

    /// Rename the corrupt file aside. Failure to quarantine is logged and
    /// otherwise ignored - the run continues with an empty in-memory map and
    /// the next successful write replaces the bad file.
    fn quarantine(&self) {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let backup = self
            .path
            .with_extension(format!("json.{QUARANTINE_SUFFIX}.{stamp}"));
        if let Err(e) = fs::rename(&self.path, &backup) {
            warn!(error = %e, "could not quarantine corrupt manifest");
        } else {
            warn!(backup = %backup.display(), "corrupt manifest moved aside");
        }
    }

    /// Serialize `map` to a temp sibling, fsync, and rename over the manifest
    /// path. The previous file stays intact and parseable unless the rename
    /// itself succeeds.
    fn persist(&self, map: &HashMap<String, ManifestEntry>) -> Result<(), ManifestError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let _lock = AdvisoryLock::acquire(&self.path);

        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension(format!("json.tmp.{}", std::process::id()));
        let result = (|| -> Result<(), ManifestError> {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Best-effort cross-process advisory lock on `<manifest>.lock`, released on
/// drop. Lock acquisition failure degrades to instance-mutex-only guarding.
struct AdvisoryLock {
    file: Option<File>,
}

impl AdvisoryLock {
    fn acquire(manifest_path: &Path) -> Self {
        let lock_path = manifest_path.with_extension("json.lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .and_then(|f| {
                f.lock_exclusive()?;
                Ok(f)
            });
        match file {
            Ok(f) => Self { file: Some(f) },
            Err(e) => {
                debug!(error = %e, "advisory manifest lock unavailable");
                Self { file: None }
            }
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

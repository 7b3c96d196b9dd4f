//! Pipeline configuration.
//!
//! All tunables live in one struct, deserializable from a TOML file and
//! overridable from CLI flags. Defaults are chosen for a local render watch:
//! small settle window, worker count from the machine, blake3 hashing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::hashing::{DEFAULT_CHUNK_SIZE, DEFAULT_MMAP_THRESHOLD, HashAlgorithm};

/// Extensions recognized as video assets.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi"];

/// Path substrings excluded from ingestion. Partial render artifacts live in
/// these locations while the render tool is still writing.
pub const DEFAULT_EXCLUDE_PATH_PATTERNS: &[&str] = &[
    "partial_movie_files", // per-segment scratch output during rendering
    ".part",
    ".tmp",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ingest pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct IngestConfig {
    /// Directory tree the render tool deposits files into. Read-only to us.
    pub source_dir: PathBuf,
    /// Destination asset directory consumed by the web app.
    pub target_dir: PathBuf,
    /// Manifest document path.
    pub manifest_path: PathBuf,
    /// Worker pool size. 0 = available parallelism.
    pub workers: usize,
    /// Cap on simultaneously in-flight file pipelines. 0 = same as workers.
    pub max_in_flight: usize,
    /// Watch-mode rescan interval.
    pub poll_interval_secs: u64,
    /// Size-stabilization settle window in milliseconds.
    pub settle_ms: u64,
    /// Hashing read chunk size in bytes.
    pub chunk_size: usize,
    /// Files at or above this size hash via mmap.
    pub mmap_threshold: u64,
    /// Digest algorithm for new manifest entries.
    pub hash_algorithm: HashAlgorithm,
    /// Recognized video extensions (lowercase, no dot).
    pub video_extensions: Vec<String>,
    /// Path substrings that disqualify a candidate.
    pub exclude_path_patterns: Vec<String>,
    /// Additional sandbox roots beyond source and target.
    pub extra_roots: Vec<PathBuf>,
    /// Index document filename inside `target_dir`.
    pub index_filename: String,
    /// Web-relative prefix recorded in index entries.
    pub web_prefix: String,
    /// Run ffprobe on each copied asset for duration/resolution/codec.
    pub probe_enabled: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("renders"),
            target_dir: PathBuf::from("assets/videos"),
            manifest_path: frameflow_logging::frameflow_home().join("manifest.json"),
            workers: 0,
            max_in_flight: 0,
            poll_interval_secs: 5,
            settle_ms: 400,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            hash_algorithm: HashAlgorithm::Blake3,
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_path_patterns: DEFAULT_EXCLUDE_PATH_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_roots: Vec::new(),
            index_filename: "index.json".to_string(),
            web_prefix: "videos".to_string(),
            probe_enabled: false,
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file. Absent keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Effective worker pool size.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Effective in-flight pipeline cap.
    pub fn effective_in_flight(&self) -> usize {
        if self.max_in_flight > 0 {
            self.max_in_flight
        } else {
            self.effective_workers()
        }
    }

    /// Check invariants once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_dir.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "source_dir is not a directory: {}",
                self.source_dir.display()
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.video_extensions.is_empty() {
            return Err(ConfigError::Invalid("video_extensions must not be empty".into()));
        }
        Ok(())
    }

    /// True when `path` carries a recognized video extension.
    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.video_extensions.iter().any(|v| *v == ext)
            })
            .unwrap_or(false)
    }

    /// True when `path` matches an exclusion pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.exclude_path_patterns
            .iter()
            .any(|pattern| text.contains(pattern.as_str()))
    }
}

//! Ingest pipeline types: per-file outcomes and batch statistics.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ingest::error::ProcessingError;
use crate::manifest::ManifestEntry;
use frameflow_security::SecurityViolation;

/// Why a candidate was rejected this pass.
#[derive(Debug)]
pub enum RejectReason {
    /// Sandbox refusal. Tied to the path's identity; retrying cannot help.
    Security(SecurityViolation),
    /// Hashing/copying failure. The file stays a candidate for the next pass.
    Processing(ProcessingError),
    /// Filtered out by extension or exclusion pattern.
    Filtered(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Security(v) => write!(f, "security: {v}"),
            Self::Processing(e) => write!(f, "processing: {e}"),
            Self::Filtered(what) => write!(f, "filtered: {what}"),
        }
    }
}

/// Terminal state of one candidate's pipeline run.
#[derive(Debug)]
pub enum FileOutcome {
    /// Copied and staged for the batch manifest commit.
    Recorded {
        key: String,
        entry: ManifestEntry,
    },
    /// Manifest already has this exact content. No-op.
    Unchanged { path: PathBuf },
    /// Size not stable yet - still being written. Retried on the next pass.
    Deferred { path: PathBuf },
    /// Failed or filtered this pass.
    Rejected {
        path: PathBuf,
        reason: RejectReason,
    },
}

/// Statistics for one batch (scan pass).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Candidates enumerated by the walker.
    pub discovered: u64,
    /// Files copied and recorded in the manifest.
    pub ingested: u64,
    /// Files whose content the manifest already records.
    pub unchanged: u64,
    /// Files still being written; deferred to the next pass.
    pub deferred: u64,
    /// Files rejected (security, processing, or filtered).
    pub rejected: u64,
    /// Whether the asset index was rebuilt this batch.
    pub index_rebuilt: bool,
    /// Wall-clock duration of the batch.
    pub duration_ms: u64,
}

/// Scene name: the filename stem.
pub fn scene_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// Quality label: the parent directory name, or "unknown" for files sitting
/// directly in the source root.
pub fn quality_label_of(path: &Path, source_root: &Path) -> String {
    match path.parent() {
        Some(parent) if parent != source_root => parent
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string()),
        _ => "unknown".to_string(),
    }
}

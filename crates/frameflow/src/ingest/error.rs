//! Ingest error taxonomy.
//!
//! Three tiers with different blast radii:
//! - [`frameflow_security::SecurityViolation`]: terminal for that path, never
//!   retried.
//! - [`ProcessingError`]: per-file; the file is rejected for this pass and
//!   remains a candidate on the next scan.
//! - [`IngestError`]: batch-level; a failed manifest commit halts the batch
//!   loudly instead of silently dropping staged entries.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::hashing::HashError;
use crate::manifest::ManifestError;
use frameflow_security::SecurityViolation;

/// Failure inside one file's pipeline. Never aborts the batch.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("source vanished before processing finished")]
    SourceVanished,

    #[error("stat failed: {0}")]
    Stat(#[source] io::Error),

    #[error("hashing failed: {0}")]
    Hash(#[from] HashError),

    #[error("copy failed: {0}")]
    Copy(#[source] io::Error),

    #[error(transparent)]
    Security(#[from] SecurityViolation),
}

/// Batch- or run-level failure.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Security(#[from] SecurityViolation),

    #[error("manifest commit failed: {0}")]
    Manifest(#[from] ManifestError),

    #[error("index rebuild failed: {0}")]
    Index(#[from] crate::ingest::index::IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

//! Frameflow - render-output ingest pipeline.
//!
//! Watches a directory tree for freshly rendered video files, verifies each
//! file is complete and unseen, copies it atomically into a destination asset
//! directory under a collision-safe name, and maintains a durable manifest
//! (content hash -> destination) plus a rebuildable `index.json` consumed by
//! the downstream web app.
//!
//! # Architecture
//!
//! - [`frameflow_security::PathSandbox`] - every path is validated against a
//!   fixed set of allowed roots before any I/O.
//! - [`hashing::ContentHasher`] - bounded-memory chunked/mmap fingerprinting.
//! - [`manifest::Manifest`] - durable atomically-written source -> record map
//!   with quarantine-and-reset corruption recovery.
//! - [`ingest::AssetCopier`] - write-to-temp-then-rename publication plus a
//!   `_latest` alias per scene.
//! - [`ingest::AssetIndexBuilder`] - wholesale index rebuilds.
//! - [`ingest::IntakeController`] - the per-file state machine, worker pool,
//!   and scan/watch drivers.

pub mod cli;
pub mod config;
pub mod hashing;
pub mod ingest;
pub mod manifest;
pub mod probe;

pub use config::IngestConfig;
pub use hashing::{ContentHasher, HashAlgorithm, HashDigest};
pub use ingest::{AssetIndexBuilder, BatchReport, IntakeController};
pub use manifest::{Manifest, ManifestEntry, ManifestError};

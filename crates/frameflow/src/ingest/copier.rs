//! Atomic asset publication.
//!
//! Bytes land in a `.part` temp sibling inside the destination directory,
//! get fsynced, and are renamed into place - consumers of the destination
//! directory never observe a file with the final name and fewer than its
//! final bytes. A `{scene}_latest{ext}` alias is refreshed after each copy;
//! the alias is a convenience, so alias failure never fails the copy.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::ingest::error::ProcessingError;
use frameflow_security::{AccessMode, PathSandbox};

pub struct AssetCopier {
    target_dir: PathBuf,
    sandbox: PathSandbox,
}

impl AssetCopier {
    pub fn new(target_dir: PathBuf, sandbox: PathSandbox) -> Self {
        Self { target_dir, sandbox }
    }

    /// Copy `source` into the destination directory under a collision-safe
    /// name derived from scene, quality, and a timestamp. Returns the final
    /// destination path.
    pub fn copy(
        &self,
        source: &Path,
        scene: &str,
        quality: &str,
    ) -> Result<PathBuf, ProcessingError> {
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let base = format!(
            "{}_{}_{stamp}",
            sanitize_component(scene),
            sanitize_component(quality)
        );

        let destination = self.unique_destination(&base, &ext);
        let destination = self
            .sandbox
            .validate(&destination, AccessMode::Output)
            .map_err(ProcessingError::Security)?;

        self.transfer(source, &destination)?;
        self.refresh_latest_alias(&destination, scene, &ext);
        Ok(destination)
    }

    /// First free `{base}{ext}`, `{base}_1{ext}`, ... inside the target dir.
    /// Repeated renders of one scene within the same second would otherwise
    /// collide.
    fn unique_destination(&self, base: &str, ext: &str) -> PathBuf {
        let mut candidate = self.target_dir.join(format!("{base}{ext}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self.target_dir.join(format!("{base}_{n}{ext}"));
            n += 1;
        }
        candidate
    }

    /// Write-to-temp-then-rename transfer. No partial file is ever visible at
    /// the final name; the temp is removed on failure.
    fn transfer(&self, source: &Path, destination: &Path) -> Result<(), ProcessingError> {
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string());
        let temp = destination.with_file_name(format!("{file_name}.part"));

        let result = (|| -> Result<(), ProcessingError> {
            let mut reader = File::open(source).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ProcessingError::SourceVanished
                } else {
                    ProcessingError::Copy(e)
                }
            })?;
            let mut writer = File::create(&temp).map_err(ProcessingError::Copy)?;
            io::copy(&mut reader, &mut writer).map_err(ProcessingError::Copy)?;
            writer.sync_all().map_err(ProcessingError::Copy)?;
            fs::rename(&temp, destination).map_err(ProcessingError::Copy)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    /// Point `{scene}_latest{ext}` at the freshly copied asset, atomically
    /// (temp link + rename). Best-effort by contract.
    fn refresh_latest_alias(&self, destination: &Path, scene: &str, ext: &str) {
        let alias = self
            .target_dir
            .join(format!("{}_latest{ext}", sanitize_component(scene)));
        match replace_alias(destination, &alias) {
            Ok(()) => debug!(alias = %alias.display(), "latest alias updated"),
            Err(e) => warn!(error = %e, alias = %alias.display(), "latest alias update failed"),
        }
    }
}

#[cfg(unix)]
fn replace_alias(destination: &Path, alias: &Path) -> io::Result<()> {
    // Link to the bare file name: the alias lives next to its target and
    // stays valid if the whole directory is moved or mounted elsewhere.
    let target = destination
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no name"))?;
    let temp = alias.with_file_name(format!(
        ".{}.tmp{}",
        alias.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
        std::process::id()
    ));
    let _ = fs::remove_file(&temp);
    std::os::unix::fs::symlink(target, &temp)?;
    fs::rename(&temp, alias)
}

#[cfg(not(unix))]
fn replace_alias(destination: &Path, alias: &Path) -> io::Result<()> {
    // No symlinks without extra privileges; fall back to a real copy.
    let temp = alias.with_extension("alias.tmp");
    fs::copy(destination, &temp)?;
    fs::rename(&temp, alias)
}

/// Restrict name components to alphanumerics, dash, underscore.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

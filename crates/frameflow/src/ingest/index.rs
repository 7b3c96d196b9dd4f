//! Asset index: a derived JSON listing of the destination directory.
//!
//! The index is a materialized view, never a source of truth: every rebuild
//! lists the directory from scratch, sorts newest-first, and atomically
//! replaces the previous document. Redundant rebuilds are harmless and
//! concurrent rebuilds race safely (last writer wins, always a full valid
//! document).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("index serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One destination asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub filename: String,
    /// Web-relative path the downstream app serves the asset under.
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// The full index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub videos: Vec<AssetRecord>,
}

pub struct AssetIndexBuilder {
    target_dir: PathBuf,
    index_filename: String,
    web_prefix: String,
    video_extensions: Vec<String>,
}

impl AssetIndexBuilder {
    pub fn new(
        target_dir: PathBuf,
        index_filename: String,
        web_prefix: String,
        video_extensions: Vec<String>,
    ) -> Self {
        Self {
            target_dir,
            index_filename,
            web_prefix,
            video_extensions,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.target_dir.join(&self.index_filename)
    }

    /// Rebuild the index from the destination directory's current contents
    /// and write it atomically.
    pub fn rebuild(&self) -> Result<AssetIndex, IndexError> {
        let mut videos = Vec::new();
        for entry in fs::read_dir(&self.target_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !self.is_indexable(&path)? {
                continue;
            }
            let meta = entry.metadata()?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            let modified: DateTime<Utc> = meta.modified()?.into();
            videos.push(AssetRecord {
                path: format!("{}/{}", self.web_prefix.trim_end_matches('/'), filename),
                filename,
                size: meta.len(),
                modified,
            });
        }

        // Newest first; name as tiebreaker for a stable order.
        videos.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.filename.cmp(&b.filename)));

        let index = AssetIndex {
            updated_at: Utc::now(),
            count: videos.len(),
            videos,
        };
        self.write_atomic(&index)?;
        debug!(count = index.count, "asset index rebuilt");
        Ok(index)
    }

    /// Regular video files only: no directories, no symlink aliases, no
    /// `_latest` fallbacks, no temp siblings, not the index itself.
    fn is_indexable(&self, path: &Path) -> Result<bool, IndexError> {
        let meta = fs::symlink_metadata(path)?;
        if !meta.is_file() {
            return Ok(false);
        }

        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => return Ok(false),
        };
        if name == self.index_filename || name.ends_with(".part") {
            return Ok(false);
        }

        let stem_is_alias = path
            .file_stem()
            .map(|s| s.to_string_lossy().ends_with("_latest"))
            .unwrap_or(false);
        if stem_is_alias {
            return Ok(false);
        }

        let has_video_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.video_extensions.iter().any(|v| *v == ext)
            })
            .unwrap_or(false);
        Ok(has_video_ext)
    }

    fn write_atomic(&self, index: &AssetIndex) -> Result<(), IndexError> {
        let path = self.index_path();
        let temp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(index)?;

        let result = (|| -> Result<(), IndexError> {
            let mut file = File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&temp, &path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn builder_for(dir: &TempDir) -> AssetIndexBuilder {
        AssetIndexBuilder::new(
            dir.path().to_path_buf(),
            "index.json".to_string(),
            "videos".to_string(),
            vec!["mp4".to_string(), "webm".to_string()],
        )
    }

    #[test]
    fn lists_videos_newest_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.mp4"), b"old").unwrap();
        fs::write(dir.path().join("new.mp4"), b"newer").unwrap();
        filetime::set_file_mtime(
            dir.path().join("old.mp4"),
            filetime::FileTime::from_unix_time(1_000_000, 0),
        )
        .unwrap();
        filetime::set_file_mtime(
            dir.path().join("new.mp4"),
            filetime::FileTime::from_unix_time(2_000_000, 0),
        )
        .unwrap();

        let index = builder_for(&dir).rebuild().unwrap();
        assert_eq!(index.count, 2);
        assert_eq!(index.videos[0].filename, "new.mp4");
        assert_eq!(index.videos[1].filename, "old.mp4");
        assert_eq!(index.videos[0].path, "videos/new.mp4");
        assert_eq!(index.videos[0].size, 5);
    }

    #[test]
    fn skips_aliases_temps_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Intro_720p30_20260101_000000.mp4"), b"x").unwrap();
        fs::write(dir.path().join("upload.mp4.part"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(
            "Intro_720p30_20260101_000000.mp4",
            dir.path().join("Intro_latest.mp4"),
        )
        .unwrap();

        let index = builder_for(&dir).rebuild().unwrap();
        assert_eq!(index.count, 1);
        assert_eq!(index.videos[0].filename, "Intro_720p30_20260101_000000.mp4");
    }

    #[test]
    fn rebuild_replaces_rather_than_merges() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        let builder = builder_for(&dir);
        assert_eq!(builder.rebuild().unwrap().count, 1);

        fs::remove_file(dir.path().join("a.mp4")).unwrap();
        fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        let index = builder.rebuild().unwrap();
        assert_eq!(index.count, 1);
        assert_eq!(index.videos[0].filename, "b.mp4");

        // On-disk document matches the returned value.
        let on_disk: AssetIndex =
            serde_json::from_slice(&fs::read(builder.index_path()).unwrap()).unwrap();
        assert_eq!(on_disk.count, 1);
        assert_eq!(on_disk.videos, index.videos);
    }

    #[test]
    fn previous_index_file_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        let builder = builder_for(&dir);
        builder.rebuild().unwrap();
        // Second rebuild with the index present still counts only the video.
        assert_eq!(builder.rebuild().unwrap().count, 1);
    }
}

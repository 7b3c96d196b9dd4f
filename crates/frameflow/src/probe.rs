//! Optional media metadata probing.
//!
//! The probe is an external collaborator: the pipeline only depends on its
//! input/output contract (path in, duration/resolution/codec out). The real
//! implementation shells out to `ffprobe` with a fixed argv - the path
//! argument is already sandbox-validated and nothing is interpreted by a
//! shell. Probe failures degrade to absent metadata; they never fail ingest.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe binary not found")]
    BinaryMissing,

    #[error("probe spawn failed: {0}")]
    Spawn(#[from] io::Error),

    #[error("probe exited with status {0}")]
    Failed(i32),

    #[error("probe output unparseable: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Metadata extracted from a media file. All fields best-effort.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeMetadata {
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
}

/// Contract for metadata extraction.
pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeMetadata, ProbeError>;
}

/// Probe that yields nothing. Stands in when probing is disabled.
pub struct NullProbe;

impl MetadataProbe for NullProbe {
    fn probe(&self, _path: &Path) -> Result<ProbeMetadata, ProbeError> {
        Ok(ProbeMetadata::default())
    }
}

/// `ffprobe`-backed implementation.
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl MetadataProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeMetadata, ProbeError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ProbeError::BinaryMissing
                } else {
                    ProbeError::Spawn(e)
                }
            })?;

        if !output.status.success() {
            return Err(ProbeError::Failed(output.status.code().unwrap_or(-1)));
        }
        parse_ffprobe_json(&output.stdout)
    }
}

#[derive(Deserialize)]
struct FfprobeDocument {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse an ffprobe JSON document into [`ProbeMetadata`].
pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<ProbeMetadata, ProbeError> {
    let doc: FfprobeDocument = serde_json::from_slice(bytes)?;

    let duration_seconds = doc
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    let video = doc
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let resolution = video.and_then(|s| match (s.width, s.height) {
        (Some(w), Some(h)) => Some(format!("{w}x{h}")),
        _ => None,
    });
    let codec = video.and_then(|s| s.codec_name.clone());

    Ok(ProbeMetadata {
        duration_seconds,
        resolution,
        codec,
    })
}

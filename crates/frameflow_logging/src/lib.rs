//! Shared logging utilities for Frameflow binaries.
//!
//! All binaries log to a size-capped rolling file under the Frameflow home
//! directory plus stderr. There is no process-wide mutable logging state
//! beyond the subscriber itself; callers construct a [`LogConfig`] and hand it
//! to [`init_logging`] once at startup.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "frameflow=info,frameflow_security=info";
const ROTATION_KEEP: usize = 4;
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;

/// Logging configuration for a Frameflow binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file-level filter on stderr instead of warnings only.
    pub verbose: bool,
    /// Suppress stderr output entirely (machine-readable output modes).
    pub quiet: bool,
}

/// Initialize tracing with a rolling file writer and a stderr layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let writer = RollingWriter::open(log_dir, config.app_name)
        .context("Failed to open rolling log file")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if config.quiet {
        EnvFilter::new("off")
    } else if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .init();

    Ok(())
}

/// The Frameflow home directory: `~/.frameflow`, or `FRAMEFLOW_HOME`.
pub fn frameflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FRAMEFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".frameflow")
}

/// The logs directory: `~/.frameflow/logs`.
pub fn logs_dir() -> PathBuf {
    frameflow_home().join("logs")
}

/// Create the logs directory if missing.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-capped rolling appender shared across tracing worker threads.
///
/// `<app>.log` is the live file; on rotation it becomes `<app>.log.1` and the
/// numbered history shifts up, dropping anything past `ROTATION_KEEP`.
#[derive(Clone)]
struct RollingWriter {
    inner: Arc<Mutex<RollingState>>,
}

struct RollingState {
    dir: PathBuf,
    base: String,
    file: File,
    written: u64,
}

impl RollingWriter {
    fn open(dir: PathBuf, app_name: &str) -> Result<Self> {
        let base: String = app_name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        let path = dir.join(format!("{base}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingState { dir, base, file, written })),
        })
    }
}

impl RollingState {
    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base))
    }

    fn numbered(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        let oldest = self.numbered(ROTATION_KEEP);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for idx in (1..ROTATION_KEEP).rev() {
            let from = self.numbered(idx);
            if from.exists() {
                fs::rename(&from, self.numbered(idx + 1))?;
            }
        }
        let live = self.live_path();
        if live.exists() {
            fs::rename(&live, self.numbered(1))?;
        }

        self.file = OpenOptions::new().create(true).append(true).open(self.live_path())?;
        self.written = 0;
        Ok(())
    }
}

struct RollingHandle {
    inner: Arc<Mutex<RollingState>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RollingHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for RollingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        if state.written + buf.len() as u64 > ROTATE_AT_BYTES {
            state.rotate()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        state.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn rolling_writer_rotates_past_cap() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = RollingWriter::open(dir.path().to_path_buf(), "testapp").unwrap();

        {
            let mut state = writer.inner.lock().unwrap();
            // Pretend the live file is already at the cap.
            state.written = ROTATE_AT_BYTES;
        }
        let mut handle = writer.make_writer();
        handle.write_all(b"next line\n").unwrap();
        handle.flush().unwrap();

        assert!(dir.path().join("testapp.log").exists());
        assert!(dir.path().join("testapp.log.1").exists());
        let live = fs::read_to_string(dir.path().join("testapp.log")).unwrap();
        assert!(live.contains("next line"));
    }

    #[test]
    fn app_name_is_sanitized() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = RollingWriter::open(dir.path().to_path_buf(), "bad/name app").unwrap();
        let mut handle = writer.make_writer();
        handle.write_all(b"x").unwrap();
        assert!(dir.path().join("bad_name_app.log").exists());
    }
}

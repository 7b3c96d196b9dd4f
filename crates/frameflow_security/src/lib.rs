//! Path sandbox for the Frameflow ingest pipeline.
//!
//! Every path the pipeline reads or writes passes through [`PathSandbox`]
//! before any filesystem mutation. Validation happens in a fixed order:
//!
//! 1. Raw-text screen: known-dangerous textual patterns are rejected before
//!    any resolution, so attacks that rely on the raw text (shell
//!    metacharacters, `~` expansion) never reach the resolver.
//! 2. Canonicalization: symlinks are followed and `.`/`..` collapsed.
//! 3. Containment: the resolved path must live under an allowed root. This is
//!    what defeats symlink escapes - a path that textually sits inside a root
//!    but resolves elsewhere is rejected here.
//! 4. Mode checks: readability for inputs, parent writability for outputs,
//!    directory-ness for directories.
//!
//! The sandbox never mutates the filesystem. Rejections are logged at `warn`
//! with the violation category; attacker-controlled strings are logged in
//! escaped debug form only.

pub mod sandbox;

pub use sandbox::{AccessMode, PathSandbox, SecurityViolation};

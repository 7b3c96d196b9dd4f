//! Content fingerprinting with bounded memory.
//!
//! Files are digested in fixed-size chunks so memory use is independent of
//! file size; large files switch to a memory-mapped read path with a
//! sequential-access hint. The digest is a pure function of the file bytes -
//! chunk size and read strategy never change the result.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default read chunk: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Files at or above this size take the memory-mapped read path.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Fingerprinting errors.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("file not found")]
    NotFound,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Digest algorithm. One pipeline instance uses a single algorithm; the
/// manifest records which one produced each stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Fast keyed tree hash; the change-detection default.
    #[default]
    Blake3,
    /// For integrity-sensitive deployments.
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blake3" => Some(Self::Blake3),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed content fingerprint: hex digest plus the algorithm that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

enum DigestState {
    Blake3(blake3::Hasher),
    Sha256(sha2::Sha256),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(blake3::Hasher::new()),
            HashAlgorithm::Sha256 => Self::Sha256(<sha2::Sha256 as sha2::Digest>::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(bytes);
            }
            Self::Sha256(h) => sha2::Digest::update(h, bytes),
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => hex::encode(sha2::Digest::finalize(h)),
        }
    }
}

/// Chunked/memory-mapped file fingerprinter.
///
/// Safe to call concurrently on different files and on the same file from
/// multiple callers; every call opens its own read handle.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    mmap_threshold: u64,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_CHUNK_SIZE, DEFAULT_MMAP_THRESHOLD)
    }
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize, mmap_threshold: u64) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.max(4096),
            mmap_threshold,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Compute the content fingerprint of the file at `path`.
    pub fn fingerprint(&self, path: &Path) -> Result<HashDigest, HashError> {
        self.fingerprint_with(path, self.algorithm)
    }

    /// Re-hash `path` and compare against an existing digest, using the
    /// algorithm the digest was recorded with.
    pub fn verify(&self, path: &Path, expected: &HashDigest) -> Result<bool, HashError> {
        let actual = self.fingerprint_with(path, expected.algorithm)?;
        Ok(actual.hex == expected.hex)
    }

    fn fingerprint_with(
        &self,
        path: &Path,
        algorithm: HashAlgorithm,
    ) -> Result<HashDigest, HashError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                HashError::NotFound
            } else {
                HashError::Io(e)
            }
        })?;
        let len = file.metadata()?.len();

        let mut state = DigestState::new(algorithm);
        if len >= self.mmap_threshold && len > 0 {
            self.feed_mmap(&file, &mut state)?;
        } else {
            self.feed_chunked(file, &mut state)?;
        }
        Ok(HashDigest {
            algorithm,
            hex: state.finalize(),
        })
    }

    fn feed_chunked(&self, mut file: File, state: &mut DigestState) -> Result<(), HashError> {
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            state.update(&buf[..n]);
        }
        Ok(())
    }

    fn feed_mmap(&self, file: &File, state: &mut DigestState) -> Result<(), HashError> {
        // Safety: the map is read-only and dropped before the handle; a
        // concurrent writer truncating the file under us is the same hazard
        // the chunked path has.
        let mmap = unsafe { memmap2::Mmap::map(file)? };
        #[cfg(unix)]
        let _ = mmap.advise(memmap2::Advice::Sequential);
        for window in mmap.chunks(self.chunk_size) {
            state.update(window);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn digest_is_stable_across_calls() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.mp4", b"frame data frame data");
        let hasher = ContentHasher::default();
        assert_eq!(
            hasher.fingerprint(&path).unwrap(),
            hasher.fingerprint(&path).unwrap()
        );
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.mp4", b"frame data 1");
        let b = write_file(&dir, "b.mp4", b"frame data 2");
        let hasher = ContentHasher::default();
        assert_ne!(
            hasher.fingerprint(&a).unwrap().hex,
            hasher.fingerprint(&b).unwrap().hex
        );
    }

    #[test]
    fn digest_independent_of_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.mp4", &vec![0xAB; 20_000]);
        let small = ContentHasher::new(HashAlgorithm::Blake3, 4096, u64::MAX);
        let large = ContentHasher::new(HashAlgorithm::Blake3, 1 << 20, u64::MAX);
        assert_eq!(
            small.fingerprint(&path).unwrap().hex,
            large.fingerprint(&path).unwrap().hex
        );
    }

    #[test]
    fn mmap_path_matches_chunked_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.mp4", &vec![0xCD; 50_000]);
        // Threshold 1 forces the mmap path; u64::MAX forces chunked reads.
        let mapped = ContentHasher::new(HashAlgorithm::Blake3, 4096, 1);
        let chunked = ContentHasher::new(HashAlgorithm::Blake3, 4096, u64::MAX);
        assert_eq!(
            mapped.fingerprint(&path).unwrap().hex,
            chunked.fingerprint(&path).unwrap().hex
        );
    }

    #[test]
    fn sha256_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "abc.bin", b"abc");
        let hasher = ContentHasher::new(HashAlgorithm::Sha256, DEFAULT_CHUNK_SIZE, u64::MAX);
        assert_eq!(
            hasher.fingerprint(&path).unwrap().hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let hasher = ContentHasher::default();
        let err = hasher.fingerprint(&dir.path().join("gone.mp4")).unwrap_err();
        assert!(matches!(err, HashError::NotFound));
    }

    #[test]
    fn verify_uses_recorded_algorithm() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.mp4", b"payload");
        let sha = ContentHasher::new(HashAlgorithm::Sha256, DEFAULT_CHUNK_SIZE, u64::MAX);
        let digest = sha.fingerprint(&path).unwrap();

        // A blake3-configured hasher still verifies a sha256 digest.
        let blake = ContentHasher::default();
        assert!(blake.verify(&path, &digest).unwrap());
    }

    #[test]
    fn algorithm_parse_roundtrip() {
        for algo in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            assert_eq!(HashAlgorithm::parse(algo.as_str()), Some(algo));
        }
        assert_eq!(HashAlgorithm::parse("md5"), None);
    }
}

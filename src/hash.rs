//! File content hashing.

use crate::error::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Computes a content hash for a file.
pub trait Hasher: Send + Sync {
    /// Hash the file at `path`, returned as lowercase hex.
    fn compute_hash(&self, path: &Path) -> Result<String>;
}

/// BLAKE3 hasher streaming the file from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn compute_hash(&self, path: &Path) -> Result<String> {
        let file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(BufReader::new(file))?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_content_based() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.cbz");
        let b = dir.path().join("b.cbz");
        std::fs::write(&a, b"same content").unwrap();
        std::fs::write(&b, b"same content").unwrap();

        let hasher = Blake3Hasher;
        let hash_a = hasher.compute_hash(&a).unwrap();
        assert_eq!(hash_a.len(), 64);
        assert_eq!(hash_a, hasher.compute_hash(&b).unwrap());

        std::fs::write(&b, b"other content").unwrap();
        assert_ne!(hash_a, hasher.compute_hash(&b).unwrap());
    }

    #[test]
    fn test_hash_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Blake3Hasher.compute_hash(&dir.path().join("missing")).is_err());
    }
}

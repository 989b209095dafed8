//! Content addresses used as cache keys by collaborators (thumbnail caches,
//! duplicate detection).

use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::CoreResult;
use crate::fs::storage::Storage;

/// Lowercase hex digest identifying a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the content address of a file.
///
/// The engine calls this lazily and caches the result on the file entry
/// until the entry changes.
pub trait ContentHasher: Send + Sync {
    fn address(&self, storage: &dyn Storage, location: &Path) -> CoreResult<ContentAddress>;
}

/// SHA-256 over the first `prefix_bytes` of the file.
#[derive(Debug, Clone, Copy)]
pub struct PrefixSha256 {
    prefix_bytes: u64,
}

impl PrefixSha256 {
    pub fn new(prefix_bytes: u64) -> Self {
        Self { prefix_bytes }
    }
}

impl ContentHasher for PrefixSha256 {
    fn address(&self, storage: &dyn Storage, location: &Path) -> CoreResult<ContentAddress> {
        let content = storage.read(location, self.prefix_bytes)?;
        let mut hasher = Sha256::new();
        hasher.update(&content);
        Ok(ContentAddress(format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryStorage;

    #[test]
    fn same_content_same_address() {
        let storage = MemoryStorage::new("/m");
        storage.write("/m/a.jpg", "hello");
        storage.write("/m/b.jpg", "hello");
        let hasher = PrefixSha256::new(1024);

        let a = hasher.address(&storage, Path::new("/m/a.jpg")).unwrap();
        let b = hasher.address(&storage, Path::new("/m/b.jpg")).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn only_prefix_is_hashed() {
        let storage = MemoryStorage::new("/m");
        storage.write("/m/a.jpg", "hello world");
        storage.write("/m/b.jpg", "hello there");
        let hasher = PrefixSha256::new(5);

        let a = hasher.address(&storage, Path::new("/m/a.jpg")).unwrap();
        let b = hasher.address(&storage, Path::new("/m/b.jpg")).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn missing_file_is_an_error() {
        let storage = MemoryStorage::new("/m");
        let hasher = PrefixSha256::new(5);
        assert!(hasher.address(&storage, Path::new("/m/x.jpg")).is_err());
    }
}

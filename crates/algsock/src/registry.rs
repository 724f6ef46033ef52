//! Digest algorithm registry
//!
//! Maps kernel algorithm names to the digest and block sizes a session
//! reports. The registry is built once and handed to [`Connection::dial`]
//! by reference.
//!
//! [`Connection::dial`]: crate::Connection::dial

use std::collections::HashMap;

/// Size information for one hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Algorithm {
    name: String,
    digest_size: usize,
    block_size: usize,
}

impl Algorithm {
    /// Kernel name of the algorithm (e.g. `"sha256"`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest size in bytes
    pub fn digest_size(&self) -> usize {
        self.digest_size
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Immutable table of known hash algorithms
#[derive(Debug, Clone, Default)]
pub struct Registry {
    hashes: HashMap<String, Algorithm>,
}

impl Registry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the hashes every mainline kernel ships
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_hash("md5", 16, 64)
            .with_hash("sha1", 20, 64)
            .with_hash("sha224", 28, 64)
            .with_hash("sha256", 32, 64)
            .with_hash("sha384", 48, 128)
            .with_hash("sha512", 64, 128)
    }

    /// Add a hash algorithm, replacing any entry with the same name
    #[must_use]
    pub fn with_hash(mut self, name: &str, digest_size: usize, block_size: usize) -> Self {
        self.hashes.insert(
            name.to_string(),
            Algorithm {
                name: name.to_string(),
                digest_size,
                block_size,
            },
        );
        self
    }

    /// Look up a hash algorithm by kernel name
    pub fn lookup(&self, name: &str) -> Option<&Algorithm> {
        self.hashes.get(name)
    }

    /// Names of all registered hashes, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hashes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

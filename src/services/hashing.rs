//! Content hashing and response-cache key derivation.
//!
//! Both are pure SHA-256 functions. Receipt hashes are re-computed by third
//! parties, so the output format is fixed: `sha256:<lowercase hex>`.

use sha2::{Digest, Sha256};

pub const HASH_PREFIX: &str = "sha256:";
pub const CACHE_KEY_PREFIX: &str = "ai:summary:";

/// Bumping this invalidates every cached summary at once.
pub const DEFAULT_CACHE_VERSION: &str = "v1";

/// Fingerprint arbitrary bytes as `sha256:<hex>`.
pub fn hash_data(data: &[u8]) -> String {
    format!("{}{}", HASH_PREFIX, hex::encode(Sha256::digest(data)))
}

/// Derives versioned cache keys for `(text, model)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyDeriver {
    version: String,
}

impl CacheKeyDeriver {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `ai:summary:` + hex(SHA-256(`"<version>:<text>:<model>"`)).
    ///
    /// No length limit or normalization is applied; callers decide what text
    /// they consider equal.
    pub fn derive(&self, text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        hasher.update(b":");
        hasher.update(model.as_bytes());
        format!("{}{}", CACHE_KEY_PREFIX, hex::encode(hasher.finalize()))
    }
}

impl Default for CacheKeyDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_VERSION)
    }
}

/// Cache key under the default version.
pub fn derive_cache_key(text: &str, model: &str) -> String {
    CacheKeyDeriver::default().derive(text, model)
}

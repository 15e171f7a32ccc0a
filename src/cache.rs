//! Optimized-image cache for incremental builds.
//!
//! Re-encoding every PNG at best compression is the slowest step of a
//! production build. This module lets image optimization skip the encoder
//! when a source file and its encoding parameters have been seen before.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by source or output path. Renaming or
//! moving an image does not invalidate anything; only changed pixels or a
//! changed quality setting do.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives `git checkout`.
//! - **`params_hash`**: SHA-256 of the encoder kind and quality.
//!
//! A hit requires a manifest entry with both hashes **and** the stored file
//! still present in the store directory.
//!
//! ## Storage
//!
//! Optimized bytes live in `.sitepipe-cache/images/` under the project root,
//! next to a JSON manifest. The store sits outside `dist` so `clean` never
//! wipes it.
//!
//! ## Bypassing the cache
//!
//! `build --no-cache` (or `images.cache = false`) skips both lookup and
//! store; every image is re-encoded.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Name of the cache manifest file within the store directory.
const MANIFEST_FILENAME: &str = ".cache-manifest.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Hex digits of each hash kept in stored file names.
const NAME_HASH_LEN: usize = 16;

/// A single stored file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk manifest mapping stored file names to their cache keys.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// Runtime reverse index: `"{source_hash}:{params_hash}"` → stored name.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    /// Create an empty manifest (first build, or cache disabled).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the store directory. Returns an empty manifest if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(store_dir: &Path) -> Self {
        let path = store_dir.join(MANIFEST_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %path.display(), "discarding unreadable cache manifest: {e}");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to the store directory, creating it if needed.
    pub fn save(&self, store_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(store_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(store_dir.join(MANIFEST_FILENAME), json)
    }

    /// Stored file name for the given hashes, if present on disk.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        store_dir: &Path,
    ) -> Option<String> {
        let content_key = format!("{}:{}", source_hash, params_hash);
        let stored = self.content_index.get(&content_key)?;
        if store_dir.join(stored).is_file() {
            Some(stored.clone())
        } else {
            None
        }
    }

    /// Record a stored file.
    pub fn insert(&mut self, stored_name: String, source_hash: String, params_hash: String) {
        let content_key = format!("{}:{}", source_hash, params_hash);

        if let Some(old) = self.content_index.get(&content_key)
            && *old != stored_name
        {
            self.entries.remove(old.as_str());
        }

        self.content_index.insert(content_key, stored_name.clone());
        self.entries.insert(
            stored_name,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(stored, entry)| {
            let content_key = format!("{}:{}", entry.source_hash, entry.params_hash);
            (content_key, stored.clone())
        })
        .collect()
}

/// File name under which optimized bytes are stored.
pub fn stored_name(source_hash: &str, params_hash: &str, extension: &str) -> String {
    let short = |h: &str| h.get(..NAME_HASH_LEN).unwrap_or(h).to_string();
    format!("{}-{}.{}", short(source_hash), short(params_hash), extension)
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of the encoding parameters for one file.
///
/// Inputs: encoder kind and quality. If either changes, the previously
/// stored output is invalid.
pub fn hash_optimize_params(kind: &str, quality: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"optimize\0");
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(quality.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    /// Files with no encoder, copied without consulting the cache.
    pub copies: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn copy(&mut self) {
        self.copies += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.hits, self.copies) {
            (0, 0) => write!(f, "{} encoded", self.misses),
            (_, 0) => write!(
                f,
                "{} cached, {} encoded ({} total)",
                self.hits,
                self.misses,
                self.total()
            ),
            _ => write!(
                f,
                "{} cached, {} encoded, {} copied ({} total)",
                self.hits,
                self.misses,
                self.copies,
                self.total()
            ),
        }
    }
}

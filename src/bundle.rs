//! Bundler collaborator: discovers content entries and gives each a stable,
//! content-derived output identifier.
//!
//! The engine never compiles anything itself. It asks a [`Bundler`] for the
//! current set of entries and compares their `output_file` identifiers with
//! the previous build: an unchanged identifier means the node can be kept as
//! is, a changed one means its source changed.
//!
//! [`ContentBundler`] is the built-in implementation. It walks the content
//! root, hashes every markdown and `.page` file with SHA-256, and derives
//! `output_file` as `<relative stem>-<first 12 hex digits>`. Compiled module
//! handles are returned in an explicit registry (`modules`), keyed by entry
//! id.
//!
//! ## Cache
//!
//! Hashing every file on every rebuild is wasteful when only one changed.
//! [`BundleCache`] remembers `(size, mtime, hash)` per file; a file whose
//! size and mtime match its cached record reuses the hash. The cache is
//! returned with every [`BundleOutput`], kept by the engine between builds,
//! and persisted as `.bundle-cache.json` in the build directory. A missing,
//! corrupt or outdated cache file loads as empty.

use crate::content::SourceKind;
use crate::paths::{relative_slash_path, strip_extension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const CACHE_FILENAME: &str = ".bundle-cache.json";

/// Bump to invalidate caches written by older versions.
const CACHE_VERSION: u32 = 1;

/// Hex digits of the content hash used in `output_file`.
const HASH_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("no content entries found under {0}")]
    NoEntries(PathBuf),
}

/// One bundle output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub id: String,
    pub output_file: String,
    pub is_entry: bool,
}

/// Handle to a compiled entry: what to load and how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub source: PathBuf,
    pub kind: SourceKind,
}

/// Cached hash of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHash {
    pub len: u64,
    pub modified_secs: u64,
    pub modified_nanos: u32,
    pub hash: String,
}

/// Per-file hash cache, keyed by source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleCache {
    pub version: u32,
    pub files: BTreeMap<String, CachedHash>,
}

impl Default for BundleCache {
    fn default() -> Self {
        Self::empty()
    }
}

impl BundleCache {
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            files: BTreeMap::new(),
        }
    }

    /// Load from the build directory; anything unreadable loads as empty.
    pub fn load(build_dir: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(build_dir.join(CACHE_FILENAME)) else {
            return Self::empty();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(cache) if cache.version == CACHE_VERSION => cache,
            _ => Self::empty(),
        }
    }

    pub fn save(&self, build_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(build_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(build_dir.join(CACHE_FILENAME), json)
    }
}

/// Result of one bundler run.
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub entries: Vec<BundleEntry>,
    /// Compiled module registry, keyed by entry id.
    pub modules: BTreeMap<String, CompiledModule>,
    pub cache: BundleCache,
}

impl BundleOutput {
    pub fn module(&self, id: &str) -> Option<&CompiledModule> {
        self.modules.get(id)
    }
}

/// Produces the current set of content entries.
pub trait Bundler: Send + Sync {
    fn bundle(&self, content_root: &Path, cache: &BundleCache) -> Result<BundleOutput, BundleError>;
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Hashes markdown and `.page` files under the content root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentBundler;

impl ContentBundler {
    fn hash_cached(
        path: &Path,
        key: &str,
        previous: &BundleCache,
        next: &mut BundleCache,
    ) -> io::Result<String> {
        let meta = std::fs::metadata(path)?;
        let modified = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let (modified_secs, modified_nanos) = (modified.as_secs(), modified.subsec_nanos());

        let hash = match previous.files.get(key) {
            Some(cached)
                if cached.len == meta.len()
                    && cached.modified_secs == modified_secs
                    && cached.modified_nanos == modified_nanos =>
            {
                cached.hash.clone()
            }
            _ => {
                debug!(file = %path.display(), "hashing");
                hash_file(path)?
            }
        };
        next.files.insert(
            key.to_string(),
            CachedHash {
                len: meta.len(),
                modified_secs,
                modified_nanos,
                hash: hash.clone(),
            },
        );
        Ok(hash)
    }
}

impl Bundler for ContentBundler {
    fn bundle(&self, content_root: &Path, cache: &BundleCache) -> Result<BundleOutput, BundleError> {
        let mut output = BundleOutput::default();

        for entry in WalkDir::new(content_root).sort_by_file_name() {
            let entry = entry.map_err(|source| BundleError::Walk {
                path: content_root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(kind) = SourceKind::from_path(path) else {
                continue;
            };

            let id = path.to_string_lossy().into_owned();
            let hash = Self::hash_cached(path, &id, cache, &mut output.cache)?;
            let rel = relative_slash_path(path, content_root);
            output.entries.push(BundleEntry {
                id: id.clone(),
                output_file: format!("{}-{}", strip_extension(&rel), &hash[..HASH_LEN]),
                is_entry: true,
            });
            output.modules.insert(
                id,
                CompiledModule {
                    source: path.to_path_buf(),
                    kind,
                },
            );
        }

        if output.entries.is_empty() {
            return Err(BundleError::NoEntries(content_root.to_path_buf()));
        }
        Ok(output)
    }
}

//! Image transform cache for incremental builds.
//!
//! Encoding is the slowest part of a build, so every image output is guarded
//! by a freshness check: a variant set is regenerated only when its
//! full-size output is missing or older than the source. Running
//! [`ImageCache::ensure_variant`] twice on an unchanged source therefore
//! performs no filesystem writes the second time.
//!
//! # Design
//!
//! Freshness is **mtime-based**, keyed on the primary (full-size) output:
//!
//! - `output` newer than `source` → the whole variant set is skipped;
//! - otherwise every variant (full size, alternate encodings, blur
//!   placeholder) is written independently, so one failing encoder does not
//!   prevent the others.
//!
//! Non-image content files go through [`copy_if_newer`] with the same rule.
//!
//! ## ImageMap
//!
//! Post-processing discovers images while rewriting HTML, concurrently across
//! pages. [`ImageMap`] is the shared, build-scoped registry of those images:
//! one [`ImageEntry`] per distinct source file, created by whichever page
//! reaches it first. The image phase then walks the map to produce variants.

use crate::config::ImagesConfig;
use crate::imaging::operations::{TINY_SUFFIX, effective_alternates};
use crate::imaging::{
    BackendError, ImageBackend, Quality, VariantConfig, fit_within, get_dimensions, plan_variants,
    variant_name, write_variants,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ImageCacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("no variant of {0} could be written")]
    AllVariantsFailed(PathBuf),
}

/// Build the variant configuration from `[images]`.
pub fn variant_config(images: &ImagesConfig) -> VariantConfig {
    VariantConfig {
        max: (images.max_width, images.max_height),
        tiny_edge: images.tiny_size,
        quality: Quality::new(images.quality),
        alternate_formats: images.alternate_formats.clone(),
    }
}

/// MIME type for an image extension.
pub fn mime_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "avif" => "image/avif",
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// One alternate encoding offered to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSource {
    pub srcset: String,
    pub mime: String,
}

/// Everything post-processing needs to know about one source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// Source file under the content root.
    pub source: PathBuf,
    /// Public path of the full-size variant, e.g. `/blog/img/a.jpg`.
    pub src: String,
    /// Public path of the blur placeholder.
    pub tiny: String,
    pub sources: Vec<ImageSource>,
    /// Dimensions of the full-size variant.
    pub width: u32,
    pub height: u32,
}

impl ImageEntry {
    pub fn new(source: PathBuf, src: String, original: (u32, u32), config: &VariantConfig) -> Self {
        let (width, height) = fit_within(original, config.max);
        let sources = effective_alternates(Path::new(&src), config)
            .into_iter()
            .map(|ext| ImageSource {
                srcset: variant_name(&src, "", Some(ext)),
                mime: mime_for(ext).to_string(),
            })
            .collect();
        Self {
            source,
            tiny: variant_name(&src, TINY_SUFFIX, None),
            src,
            sources,
            width,
            height,
        }
    }
}

/// Build-scoped registry of images discovered during post-processing.
#[derive(Debug, Default)]
pub struct ImageMap {
    entries: Mutex<BTreeMap<PathBuf, ImageEntry>>,
}

impl ImageMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, ImageEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, source: &Path) -> Option<ImageEntry> {
        self.lock().get(source).cloned()
    }

    /// Return the entry for `source`, creating it with `make` if absent.
    ///
    /// `make` runs without the lock held. If two pages race on the same
    /// image, the first insert wins and both receive that entry.
    pub fn get_or_try_insert<E>(
        &self,
        source: &Path,
        make: impl FnOnce() -> Result<ImageEntry, E>,
    ) -> Result<ImageEntry, E> {
        if let Some(existing) = self.get(source) {
            return Ok(existing);
        }
        let created = make()?;
        Ok(self
            .lock()
            .entry(source.to_path_buf())
            .or_insert(created)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all entries, ordered by source path.
    pub fn entries(&self) -> Vec<ImageEntry> {
        self.lock().values().cloned().collect()
    }
}

/// Whether `dest` exists and was modified strictly after `src`.
///
/// Any error reading either timestamp counts as "not newer".
pub fn is_newer(dest: &Path, src: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified());
    match (modified(dest), modified(src)) {
        (Ok(dest_time), Ok(src_time)) => dest_time > src_time,
        _ => false,
    }
}

/// Copy `src` to `dest` unless `dest` is already newer. Returns whether a
/// copy happened.
pub fn copy_if_newer(src: &Path, dest: &Path) -> io::Result<bool> {
    if is_newer(dest, src) {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    Ok(true)
}

/// What [`ImageCache::ensure_variant`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    /// Output already newer than the source; nothing touched.
    Fresh,
    Generated { written: usize, failed: usize },
}

/// Generates image variants through a backend, skipping fresh outputs.
pub struct ImageCache<'a> {
    backend: &'a dyn ImageBackend,
    config: VariantConfig,
}

impl<'a> ImageCache<'a> {
    pub fn new(backend: &'a dyn ImageBackend, config: VariantConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    /// Make sure the full-size, alternate and tiny variants of `source`
    /// exist at `output` (plus derived names).
    pub fn ensure_variant(
        &self,
        source: &Path,
        output: &Path,
    ) -> Result<VariantOutcome, ImageCacheError> {
        if is_newer(output, source) {
            debug!(source = %source.display(), "variants up to date");
            return Ok(VariantOutcome::Fresh);
        }

        let original = get_dimensions(self.backend, source)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let plan = plan_variants(source, output, original, &self.config);
        let results = write_variants(self.backend, &plan);
        for (path, error) in &results.failed {
            warn!(output = %path.display(), %error, "image variant failed");
        }
        if results.written.is_empty() {
            return Err(ImageCacheError::AllVariantsFailed(source.to_path_buf()));
        }
        Ok(VariantOutcome::Generated {
            written: results.written.len(),
            failed: results.failed.len(),
        })
    }
}

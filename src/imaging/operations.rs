//! High-level image operations.
//!
//! These functions combine calculations with backend execution: they take a
//! [`VariantConfig`], compute the concrete [`ResizeParams`] for every variant
//! of a source image, and hand them to the backend.
//!
//! Variant naming, for an output path `blog/img/photo.jpg`:
//!
//! | Variant | Path |
//! |---|---|
//! | Full size (bounded box, same format) | `blog/img/photo.jpg` |
//! | Alternate encodings | `blog/img/photo.avif`, `blog/img/photo.webp` |
//! | Blur placeholder | `blog/img/photo__tiny.jpg` |

use super::backend::{BackendError, ImageBackend};
use super::calculations::{fit_within, tiny_dimensions};
use super::params::{Quality, ResizeParams};
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Suffix appended to the file stem of the blur placeholder.
pub const TINY_SUFFIX: &str = "__tiny";

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &dyn ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Configuration for variant generation.
#[derive(Debug, Clone)]
pub struct VariantConfig {
    /// Bounding box of the full-size variant.
    pub max: (u32, u32),
    /// Edge of the square box the blur placeholder fits in.
    pub tiny_edge: u32,
    pub quality: Quality,
    /// Extensions of the alternate encodings (e.g. `avif`, `webp`).
    pub alternate_formats: Vec<String>,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            max: (2000, 1200),
            tiny_edge: 10,
            quality: Quality::default(),
            alternate_formats: vec!["avif".into(), "webp".into()],
        }
    }
}

/// Rewrite the file name of a `/`-separated path: append `suffix` to the
/// stem and optionally replace the extension.
///
/// - `("img/a.jpg", "__tiny", None)` → `"img/a__tiny.jpg"`
/// - `("img/a.jpg", "", Some("webp"))` → `"img/a.webp"`
/// - `("img/a", "__tiny", None)` → `"img/a__tiny"`
pub fn variant_name(path: &str, suffix: &str, ext: Option<&str>) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    let (stem, current_ext) = match file.rfind('.') {
        Some(i) if i > 0 => (&file[..i], Some(&file[i + 1..])),
        _ => (file, None),
    };
    match ext.or(current_ext) {
        Some(e) => format!("{dir}{stem}{suffix}.{e}"),
        None => format!("{dir}{stem}{suffix}"),
    }
}

/// Path of the blur placeholder for a full-size output.
pub fn tiny_path(output: &Path) -> PathBuf {
    PathBuf::from(variant_name(&output.to_string_lossy(), TINY_SUFFIX, None))
}

/// Path of an alternate encoding for a full-size output.
pub fn alternate_path(output: &Path, ext: &str) -> PathBuf {
    PathBuf::from(variant_name(&output.to_string_lossy(), "", Some(ext)))
}

/// Alternate formats that differ from the output's own extension.
pub fn effective_alternates<'a>(output: &Path, config: &'a VariantConfig) -> Vec<&'a str> {
    let own = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    config
        .alternate_formats
        .iter()
        .map(String::as_str)
        .filter(|ext| own.as_deref() != Some(ext.to_lowercase().as_str()))
        .collect()
}

/// Plan every variant for `source` written at `output`.
///
/// Order: full size, alternates (in config order), tiny placeholder.
pub fn plan_variants(
    source: &Path,
    output: &Path,
    original: (u32, u32),
    config: &VariantConfig,
) -> Vec<ResizeParams> {
    let (width, height) = fit_within(original, config.max);
    let sized = |output: PathBuf, (width, height): (u32, u32)| ResizeParams {
        source: source.to_path_buf(),
        output,
        width,
        height,
        quality: config.quality,
    };

    let mut plan = vec![sized(output.to_path_buf(), (width, height))];
    for ext in effective_alternates(output, config) {
        plan.push(sized(alternate_path(output, ext), (width, height)));
    }
    plan.push(sized(
        tiny_path(output),
        tiny_dimensions(original, config.tiny_edge),
    ));
    plan
}

/// Outcome of writing a planned set of variants.
#[derive(Debug, Default)]
pub struct VariantResults {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, BackendError)>,
}

/// Execute a plan. Each variant is written independently: one failing
/// encoder does not prevent the others.
pub fn write_variants(backend: &dyn ImageBackend, plan: &[ResizeParams]) -> VariantResults {
    let mut results = VariantResults::default();
    for params in plan {
        match backend.resize(params) {
            Ok(()) => results.written.push(params.output.clone()),
            Err(e) => results.failed.push((params.output.clone(), e)),
        }
    }
    results
}

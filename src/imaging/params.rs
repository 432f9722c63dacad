//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They sit between the
//! [`operations`](super::operations) module (which plans the variants of a
//! source image) and the [`backend`](super::backend) (which does the pixel
//! work), so a mock backend can record plans without encoding anything.
//!
//! - [`Quality`]: Lossy encoding quality (1 to 100, default 80). Clamped on construction.
//! - [`ResizeParams`]: Source, output path, target box and quality for one variant.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Parameters for writing one resized variant.
///
/// `width`/`height` are the final pixel dimensions; the output format is
/// chosen from the extension of `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}

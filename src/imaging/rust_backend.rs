//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::ResizeParams;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::BufWriter;
use std::path::Path;

/// Extensions the backend can decode.
const DECODABLE: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Returns the image file extensions that have decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    DECODABLE
}

/// Extensions [`RustBackend`] can write variants as.
pub fn supported_output_extensions() -> &'static [&'static str] {
    &["jpg", "jpeg", "png", "webp", "avif"]
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn encode_failed(format: &str, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("{format} encode failed: {e}"))
}

/// Save a DynamicImage to the given path, choosing the encoder from the extension.
fn save_image(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => {
            let writer = BufWriter::new(std::fs::File::create(path)?);
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality as u8);
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| encode_failed("JPEG", e))
        }
        "png" => {
            let writer = BufWriter::new(std::fs::File::create(path)?);
            img.write_with_encoder(image::codecs::png::PngEncoder::new(writer))
                .map_err(|e| encode_failed("PNG", e))
        }
        "webp" => {
            let writer = BufWriter::new(std::fs::File::create(path)?);
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(writer))
                .map_err(|e| encode_failed("WebP", e))
        }
        "avif" => save_avif(img, path, quality),
        other => Err(BackendError::ProcessingFailed(format!(
            "Unsupported output format: {}",
            other
        ))),
    }
}

/// Encode and save as AVIF using ravif/rav1e (speed=6 for reasonable throughput).
fn save_avif(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let writer = BufWriter::new(std::fs::File::create(path)?);
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(writer, 6, quality as u8);
    img.write_with_encoder(encoder)
        .map_err(|e| encode_failed("AVIF", e))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read dimensions of {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let resized = if (img.width(), img.height()) == (params.width, params.height) {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        save_image(&resized, &params.output, params.quality.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use image::RgbImage;
    use tempfile::TempDir;

    fn create_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn resize_synthetic_to_webp_and_jpeg() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 200, 100);
        let backend = RustBackend::new();

        for name in ["out.webp", "out.jpg", "out.png"] {
            let output = tmp.path().join(name);
            backend
                .resize(&ResizeParams {
                    source: source.clone(),
                    output: output.clone(),
                    width: 20,
                    height: 10,
                    quality: Quality::new(80),
                })
                .unwrap();

            let dims = backend.identify(&output).unwrap();
            assert_eq!(dims, Dimensions { width: 20, height: 10 }, "{name}");
        }
    }

    #[test]
    fn resize_unsupported_format_errors() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 20, 20);

        let result = RustBackend::new().resize(&ResizeParams {
            source,
            output: tmp.path().join("out.bmp"),
            width: 10,
            height: 10,
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn supported_extensions_cover_common_formats() {
        let exts = supported_input_extensions();
        assert!(exts.contains(&"jpg"));
        assert!(exts.contains(&"png"));
        assert!(!exts.contains(&"avif"));
    }
}

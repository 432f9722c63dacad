//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait has two operations: identify (read dimensions
//! without decoding pixels) and resize (decode, scale, encode one variant).
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ResizeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Must be `Sync`: post-processing probes dimensions and the image phase
/// encodes variants from rayon workers.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Write one resized variant.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        /// Dimensions reported for every identified path. `None` fails identify.
        pub dimensions: Option<Dimensions>,
        /// Output paths containing any of these substrings fail to encode.
        pub failing_outputs: Vec<String>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Resize {
            source: String,
            output: String,
            width: u32,
            height: u32,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions { width, height }),
                ..Self::default()
            }
        }

        pub fn failing_on(mut self, output_fragment: &str) -> Self {
            self.failing_outputs.push(output_fragment.to_string());
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn resize_outputs(&self) -> Vec<String> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Resize { output, .. } => Some(output),
                    RecordedOp::Identify(_) => None,
                })
                .collect()
        }
    }

    /// Lets a test keep a handle on the backend it hands to an engine.
    impl ImageBackend for Arc<MockBackend> {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.as_ref().identify(path)
        }

        fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
            self.as_ref().resize(params)
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            self.dimensions
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
            let output = params.output.to_string_lossy().to_string();
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                source: params.source.to_string_lossy().to_string(),
                output: output.clone(),
                width: params.width,
                height: params.height,
                quality: params.quality.value(),
            });
            if self.failing_outputs.iter().any(|f| output.contains(f)) {
                return Err(BackendError::ProcessingFailed(format!(
                    "mock encode failure for {output}"
                )));
            }
            Ok(())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_without_dimensions_fails_identify() {
        let backend = MockBackend::new();
        assert!(backend.identify(Path::new("/missing.jpg")).is_err());
    }

    #[test]
    fn mock_records_resize_and_injected_failure() {
        let backend = MockBackend::new().failing_on(".webp");
        let params = |output: &str| ResizeParams {
            source: "/source.jpg".into(),
            output: output.into(),
            width: 800,
            height: 600,
            quality: super::super::params::Quality::new(90),
        };

        assert!(backend.resize(&params("/out.jpg")).is_ok());
        assert!(backend.resize(&params("/out.webp")).is_err());

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[0],
            RecordedOp::Resize {
                width: 800,
                height: 600,
                quality: 90,
                ..
            }
        ));
    }
}

//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Resize → JPEG/PNG/WebP** | Lanczos3 + `image` codecs |
//! | **Resize → AVIF** | Lanczos3 + rav1e encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Variant planning and naming, executed through a backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_within, tiny_dimensions};
pub use operations::{
    VariantConfig, alternate_path, get_dimensions, plan_variants, tiny_path, variant_name,
    write_variants,
};
pub use params::{Quality, ResizeParams};
pub use rust_backend::RustBackend;

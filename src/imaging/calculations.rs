//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Fit `source` inside a `bounds` box, preserving aspect ratio.
///
/// Never enlarges: a source already inside the box is returned unchanged.
/// Neither output edge drops below one pixel.
///
/// # Examples
/// ```
/// # use sitewright::imaging::fit_within;
/// // 4000x3000 inside 2000x1200 → height-bound
/// assert_eq!(fit_within((4000, 3000), (2000, 1200)), (1600, 1200));
///
/// // Small images are left alone
/// assert_eq!(fit_within((640, 480), (2000, 1200)), (640, 480));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 {
        return (src_w, src_h);
    }
    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Dimensions of the square-bounded blur placeholder.
pub fn tiny_dimensions(source: (u32, u32), edge: u32) -> (u32, u32) {
    fit_within(source, (edge, edge))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within tests
    // =========================================================================

    #[test]
    fn fit_landscape_width_bound() {
        assert_eq!(fit_within((4000, 1000), (2000, 1200)), (2000, 500));
    }

    #[test]
    fn fit_landscape_height_bound() {
        assert_eq!(fit_within((4000, 3000), (2000, 1200)), (1600, 1200));
    }

    #[test]
    fn fit_portrait() {
        assert_eq!(fit_within((3000, 4000), (2000, 1200)), (900, 1200));
    }

    #[test]
    fn fit_never_enlarges() {
        assert_eq!(fit_within((100, 50), (2000, 1200)), (100, 50));
    }

    #[test]
    fn fit_exact_bounds_unchanged() {
        assert_eq!(fit_within((2000, 1200), (2000, 1200)), (2000, 1200));
    }

    #[test]
    fn fit_extreme_panorama_keeps_one_pixel() {
        assert_eq!(fit_within((100_000, 10), (2000, 1200)), (2000, 1));
    }

    #[test]
    fn fit_zero_source_passthrough() {
        assert_eq!(fit_within((0, 0), (10, 10)), (0, 0));
    }

    // =========================================================================
    // tiny_dimensions tests
    // =========================================================================

    #[test]
    fn tiny_landscape() {
        assert_eq!(tiny_dimensions((1600, 1200), 10), (10, 8));
    }

    #[test]
    fn tiny_square() {
        assert_eq!(tiny_dimensions((500, 500), 10), (10, 10));
    }
}

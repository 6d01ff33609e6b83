//! Raster input preprocessing
//!
//! Scanned photos and screenshots routinely arrive below the resolution
//! the recognition engine needs. Before invocation, raster inputs are
//! upscaled toward 300 DPI (estimated from the page width), converted to
//! grayscale, contrast-stretched, and binarized. PDFs pass through
//! untouched.

use std::path::Path;

use anyhow::Context;
use image::imageops::FilterType;
use image::GrayImage;
use tracing::{debug, info, warn};

/// Resolution the recognition engine works best at
pub const TARGET_DPI: f64 = 300.0;

/// Interline spacing the engine is tuned for, in pixels at [`TARGET_DPI`]
pub const TARGET_INTERLINE_PX: f64 = 20.0;

/// Below this interline the engine starts misreading staff lines
pub const MIN_INTERLINE_PX: f64 = 15.0;

/// Page width assumed when estimating the scan's DPI (US letter / A4-ish)
const ASSUMED_PAGE_WIDTH_INCHES: f64 = 8.5;

/// Upscaling beyond this factor only amplifies noise
const MAX_UPSCALE: f64 = 3.0;

/// Estimate the DPI of a scan from its pixel width
pub fn estimate_dpi(width_px: u32) -> f64 {
    width_px as f64 / ASSUMED_PAGE_WIDTH_INCHES
}

/// Estimate the interline spacing a scan of this width would yield,
/// assuming staves engraved for [`TARGET_INTERLINE_PX`] at [`TARGET_DPI`]
pub fn estimate_interline(width_px: u32) -> f64 {
    TARGET_INTERLINE_PX * estimate_dpi(width_px) / TARGET_DPI
}

/// Scale factor that brings an image toward [`TARGET_DPI`], capped
pub fn upscale_factor(width_px: u32) -> f64 {
    (TARGET_DPI / estimate_dpi(width_px)).clamp(1.0, MAX_UPSCALE)
}

/// Preprocess one raster input for recognition, writing a PNG to `output`
pub fn preprocess_image(input: &Path, output: &Path) -> anyhow::Result<()> {
    let img = image::open(input)
        .with_context(|| format!("Failed to decode image {}", input.display()))?;

    let factor = upscale_factor(img.width());
    debug!(
        width = img.width(),
        estimated_dpi = estimate_dpi(img.width()),
        factor,
        "Preprocessing raster input"
    );

    let img = if factor > 1.0 {
        let w = (img.width() as f64 * factor).round() as u32;
        let h = (img.height() as f64 * factor).round() as u32;
        img.resize(w, h, FilterType::Lanczos3)
    } else {
        img
    };

    let interline = estimate_interline(img.width());
    if interline < MIN_INTERLINE_PX {
        warn!(
            interline,
            width = img.width(),
            "Estimated interline spacing below {} px; recognition may reject this scan",
            MIN_INTERLINE_PX
        );
    }

    let mut gray = img.to_luma8();
    stretch_contrast(&mut gray);
    binarize(&mut gray);

    gray.save(output)
        .with_context(|| format!("Failed to write preprocessed image {}", output.display()))?;

    info!(
        output = %output.display(),
        interline,
        "Raster input preprocessed"
    );
    Ok(())
}

/// Linear contrast stretch over the observed luminance range.
/// Faded pencil scans benefit the most; already full-range images are
/// unchanged.
fn stretch_contrast(img: &mut GrayImage) {
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for pixel in img.pixels() {
        lo = lo.min(pixel.0[0]);
        hi = hi.max(pixel.0[0]);
    }

    if hi <= lo || (lo == 0 && hi == 255) {
        return;
    }

    let range = (hi - lo) as f64;
    for pixel in img.pixels_mut() {
        let v = (pixel.0[0] - lo) as f64 / range * 255.0;
        pixel.0[0] = v.round() as u8;
    }
}

/// Threshold against the mean luminance. Staff lines and note heads sit
/// well below the paper's mean, so a global threshold holds up on typical
/// scans. A uniform image has no ink and stays white.
fn binarize(img: &mut GrayImage) {
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let mean = (sum / count) as u8;

    for pixel in img.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < mean { 0 } else { 255 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn dpi_estimate_uses_page_width() {
        assert_eq!(estimate_dpi(850), 100.0);
        assert_eq!(estimate_dpi(2550), 300.0);
    }

    #[test]
    fn upscale_targets_300_dpi_with_a_cap() {
        // 100 DPI scan wants 3x, exactly at the cap
        assert_eq!(upscale_factor(850), 3.0);
        // 50 DPI scan would want 6x but is capped
        assert_eq!(upscale_factor(425), 3.0);
        // 300 DPI scan needs nothing
        assert_eq!(upscale_factor(2550), 1.0);
        // oversampled scans are never shrunk
        assert_eq!(upscale_factor(5100), 1.0);
    }

    #[test]
    fn interline_estimate_tracks_scan_resolution() {
        // full 300 DPI page lands on the engine's tuned spacing
        assert_eq!(estimate_interline(2550), 20.0);
        // a ~200 DPI scan falls below the warning threshold
        assert!(estimate_interline(1700) < MIN_INTERLINE_PX);
        assert!(estimate_interline(2000) > MIN_INTERLINE_PX);
    }

    #[test]
    fn contrast_stretch_expands_narrow_ranges() {
        let mut img = GrayImage::from_fn(4, 1, |x, _| match x {
            0 => Luma([100u8]),
            3 => Luma([150u8]),
            _ => Luma([125u8]),
        });
        stretch_contrast(&mut img);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn full_range_images_are_untouched() {
        let mut img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0u8 } else { 255 }]));
        let before: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        stretch_contrast(&mut img);
        let after: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn binarize_splits_on_the_mean() {
        let mut img = GrayImage::from_fn(4, 1, |x, _| match x {
            0 => Luma([30u8]),
            1 => Luma([60u8]),
            _ => Luma([220u8]),
        });
        binarize(&mut img);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 0).0[0], 0);
        assert_eq!(img.get_pixel(2, 0).0[0], 255);
        assert_eq!(img.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn uniform_images_binarize_to_white() {
        let mut img = GrayImage::from_pixel(3, 3, Luma([128u8]));
        binarize(&mut img);
        assert!(img.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn preprocess_writes_an_upscaled_bilevel_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        let output = dir.path().join("pre.png");

        // 425px wide = ~50 DPI; should be upscaled 3x
        let img = GrayImage::from_pixel(425, 550, Luma([200u8]));
        img.save(&input).unwrap();

        preprocess_image(&input, &output).unwrap();

        let result = image::open(&output).unwrap();
        assert_eq!(result.width(), 1275);
        assert_eq!(result.height(), 1650);
        // output holds only ink and paper values
        assert!(result.to_luma8().pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}

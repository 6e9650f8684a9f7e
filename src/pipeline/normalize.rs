//! Image normalization: trim white borders and re-encode for the tracer.
//!
//! The tracer consumes uncompressed bitmaps, not PNGs, and traces better
//! when the drawing fills the canvas. Normalization therefore does three
//! things per glyph: validate the decoded dimensions against the configured
//! bounds, crop away the all-white margin the drawing surface leaves around
//! the stroke, and flatten the result onto an opaque 24-bit BMP.
//!
//! A pixel counts as white when each of R, G and B exceeds 245; the alpha
//! channel is ignored for the test but flattened against white in the
//! output. A fully white (or fully transparent) canvas has no bounding box
//! and passes through uncropped — a blank glyph is a legitimate input, not
//! a crash.
//!
//! Everything here is CPU-bound pixel work, so each glyph runs under
//! `spawn_blocking`.

use std::path::PathBuf;

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tracing::debug;

use crate::error::GlyphError;
use crate::pipeline::extract::GlyphSource;

/// Channel threshold above which a pixel is considered white.
const WHITE_THRESHOLD: u8 = 245;

/// True if the pixel is white or near-white. Alpha is ignored.
pub fn is_white(pixel: &Rgba<u8>) -> bool {
    let [r, g, b, _a] = pixel.0;
    r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD
}

/// Crop away the all-white border, keeping the inclusive bounding box of
/// non-white pixels. A blank image is returned unchanged.
pub fn trim_whitespace(src: &RgbaImage) -> RgbaImage {
    let (width, height) = src.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0u32;
    let mut max_y = 0u32;

    for (x, y, pixel) in src.enumerate_pixels() {
        if !is_white(pixel) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if max_x < min_x || max_y < min_y {
        // No non-white pixel anywhere: blank glyph, pass through.
        return src.clone();
    }

    image::imageops::crop_imm(src, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image()
}

/// Flatten alpha against a white background into opaque 24-bit RGB.
pub fn flatten_onto_white(src: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(src.width(), src.height());
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = u16::from(a);
        let blend = |c: u8| -> u8 { ((u16::from(c) * a + 255 * (255 - a)) / 255) as u8 };
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Decode, validate, trim, and re-encode one glyph to BMP.
///
/// On success the BMP lands beside the source PNG (same stem, `.bmp`
/// extension) and the PNG is removed. Failures are per-glyph: the caller
/// records them and continues with the remaining glyphs.
pub async fn normalize_glyph(
    glyph: &GlyphSource,
    min_size: u32,
    max_size: u32,
) -> Result<PathBuf, GlyphError> {
    let code_point = glyph.code_point;
    let glyph = glyph.clone();
    tokio::task::spawn_blocking(move || normalize_blocking(&glyph, min_size, max_size))
        .await
        .unwrap_or_else(|e| {
            Err(GlyphError::DecodeFailed {
                code_point,
                detail: format!("normalize task panicked: {e}"),
            })
        })
}

/// Blocking implementation of glyph normalization.
fn normalize_blocking(
    glyph: &GlyphSource,
    min_size: u32,
    max_size: u32,
) -> Result<PathBuf, GlyphError> {
    let code_point = glyph.code_point;

    let decoded = image::open(&glyph.png_path).map_err(|e| GlyphError::DecodeFailed {
        code_point,
        detail: e.to_string(),
    })?;
    let rgba: RgbaImage = decoded.to_rgba8();

    let (width, height) = rgba.dimensions();
    if width < min_size || height < min_size || width > max_size || height > max_size {
        return Err(GlyphError::BadDimensions {
            code_point,
            width,
            height,
            min: min_size,
            max: max_size,
        });
    }

    let cropped = trim_whitespace(&rgba);
    let flattened = flatten_onto_white(&cropped);

    let bmp_path = glyph.png_path.with_extension("bmp");
    flattened
        .save_with_format(&bmp_path, image::ImageFormat::Bmp)
        .map_err(|e| GlyphError::DecodeFailed {
            code_point,
            detail: format!("BMP encode failed: {e}"),
        })?;

    // The PNG has served its purpose; only the BMP feeds the tracer. A
    // failed delete is harmless — the workspace is removed with the job.
    if let Err(e) = std::fs::remove_file(&glyph.png_path) {
        debug!(code_point, error = %e, "failed to delete source PNG");
    }

    debug!(
        code_point,
        width = flattened.width(),
        height = flattened.height(),
        "glyph normalized"
    );
    Ok(bmp_path)
}

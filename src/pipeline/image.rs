//! Image normalisation: load, bound, enhance, and encode chart images.
//!
//! VLM APIs accept images as base64 data-URIs embedded in the JSON request
//! body. PNG is chosen over JPEG because it is lossless — axis-label
//! crispness matters far more than file size for numeric read-off accuracy.
//!
//! ## Stage order
//!
//! ```text
//! load ──▶ resize ──▶ enhance ──▶ encode
//! (gate)   (bound)    (optional)  (PNG+base64)
//! ```
//!
//! Enhancement is the only stage allowed to fail quietly: on any error the
//! unenhanced image is used and a warning logged. Encoding has no fallback —
//! the base64 PNG payload is the one form the transport accepts.

use crate::config::AnalysisConfig;
use crate::error::ChartError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Extensions accepted by the format gate (case-insensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// CLAHE tile grid: 8×8 tiles across the luma plane.
const CLAHE_GRID: u32 = 8;
/// CLAHE contrast clip limit, as a multiple of the uniform bin height.
const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// A chart image normalised for transmission.
///
/// `width`/`height` are the post-resize, pre-enhancement pixel dimensions;
/// enhancement never changes geometry.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Base64 of the lossless PNG encoding of the final pixel buffer.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    /// Wrap the payload for the multimodal API request body.
    ///
    /// `detail: "high"` instructs GPT-4-class models to use the full image
    /// tile budget; without it small axis labels and legends are lost.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), "image/png").with_detail("high")
    }

    /// Render as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }
}

/// Complete normalisation pipeline: load → resize → enhance → encode.
pub fn normalize(path: &Path, config: &AnalysisConfig) -> Result<NormalizedImage, ChartError> {
    let img = load(path)?;
    let img = resize(img, config.max_dimension);
    let (width, height) = (img.width(), img.height());

    let img = if config.enhance { enhance(img) } else { img };

    let base64 = encode_png_base64(&img)?;
    debug!(
        "Normalised {} → {}x{} px, {} bytes base64",
        path.display(),
        width,
        height,
        base64.len()
    );

    Ok(NormalizedImage {
        base64,
        width,
        height,
    })
}

/// Load an image, enforcing the supported-format gate before decoding.
pub fn load(path: &Path) -> Result<DynamicImage, ChartError> {
    if !path.exists() {
        return Err(ChartError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ChartError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: if extension.is_empty() {
                "(none)".into()
            } else {
                format!(".{extension}")
            },
        });
    }

    image::open(path).map_err(|e| ChartError::DecodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Bound the longest side to `max_dimension`, preserving aspect ratio.
///
/// Already-small images are returned unchanged. Downscaling uses box
/// sampling (`thumbnail_exact`), which averages source pixels per output
/// pixel and so avoids the aliasing a point filter would add to thin grid
/// lines.
pub fn resize(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width.max(height) <= max_dimension {
        return img;
    }

    let (new_width, new_height) = scaled_dimensions(width, height, max_dimension);
    debug!(
        "Resized image from {}x{} to {}x{}",
        width, height, new_width, new_height
    );
    img.thumbnail_exact(new_width, new_height)
}

/// New dimensions with the longest side at `max_dimension` and the other
/// scaled proportionally, rounded to the nearest pixel (floor 1).
pub(crate) fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if height >= width {
        let scale = max_dimension as f64 / height as f64;
        let w = ((width as f64 * scale).round() as u32).max(1);
        (w, max_dimension)
    } else {
        let scale = max_dimension as f64 / width as f64;
        let h = ((height as f64 * scale).round() as u32).max(1);
        (max_dimension, h)
    }
}

/// Contrast/sharpness enhancement with silent fallback.
///
/// On any failure the original image is returned unchanged; the error is a
/// diagnostic note, not a pipeline outcome.
pub fn enhance(img: DynamicImage) -> DynamicImage {
    match try_enhance(&img) {
        Ok(enhanced) => {
            debug!("Image enhancement applied");
            enhanced
        }
        Err(reason) => {
            warn!("Image enhancement failed: {reason}; using unenhanced image");
            img
        }
    }
}

/// Adaptive local contrast (CLAHE on the luma plane) followed by a mild
/// 3×3 sharpening convolution.
///
/// The image is split into BT.601 luma/chroma planes so equalisation
/// touches brightness only — re-mapping RGB channels independently would
/// shift hues.
fn try_enhance(img: &DynamicImage) -> Result<DynamicImage, String> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err("image has a zero dimension".into());
    }

    // RGB → (luma, chroma) planes.
    let pixel_count = (width as usize) * (height as usize);
    let mut luma = vec![0u8; pixel_count];
    let mut cb = vec![0f32; pixel_count];
    let mut cr = vec![0f32; pixel_count];
    for (i, p) in rgb.pixels().enumerate() {
        let [r, g, b] = p.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        luma[i] = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        cb[i] = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        cr[i] = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    }

    let equalized = clahe(&luma, width, height)?;

    // Recombine planes → RGB.
    let mut out = RgbImage::new(width, height);
    for (i, p) in out.pixels_mut().enumerate() {
        let y = equalized[i] as f32;
        let (cb, cr) = (cb[i] - 128.0, cr[i] - 128.0);
        let r = (y + 1.402 * cr).round().clamp(0.0, 255.0) as u8;
        let g = (y - 0.344_136 * cb - 0.714_136 * cr).round().clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * cb).round().clamp(0.0, 255.0) as u8;
        p.0 = [r, g, b];
    }

    // Sharpening kernel: center 9, neighbours −1, normalised by 9.
    let kernel = [
        -1.0 / 9.0,
        -1.0 / 9.0,
        -1.0 / 9.0,
        -1.0 / 9.0,
        9.0 / 9.0,
        -1.0 / 9.0,
        -1.0 / 9.0,
        -1.0 / 9.0,
        -1.0 / 9.0,
    ];
    let sharpened = image::imageops::filter3x3(&out, &kernel);

    Ok(DynamicImage::ImageRgb8(sharpened))
}

/// Contrast-limited adaptive histogram equalisation over a fixed tile grid.
///
/// Each tile gets its own clipped-histogram lookup table; per-pixel output
/// bilinearly interpolates between the four surrounding tile tables, which
/// removes the visible tile seams plain adaptive equalisation produces.
fn clahe(luma: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let grid = CLAHE_GRID.min(width).min(height).max(1);
    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);
    if tile_w == 0 || tile_h == 0 {
        return Err("degenerate tile geometry".into());
    }

    // One 256-entry mapping per tile.
    let grid = grid as usize;
    let mut tables = vec![[0u8; 256]; grid * grid];

    for ty in 0..grid {
        for tx in 0..grid {
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            let area = ((x1 - x0) * (y1 - y0)) as f32;
            if area == 0.0 {
                continue;
            }

            let mut hist = [0f32; 256];
            for y in y0..y1 {
                let row = (y * width) as usize;
                for x in x0..x1 {
                    hist[luma[row + x as usize] as usize] += 1.0;
                }
            }

            // Clip and redistribute the excess uniformly.
            let clip = (CLAHE_CLIP_LIMIT * area / 256.0).max(1.0);
            let mut excess = 0.0;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256.0;
            for bin in hist.iter_mut() {
                *bin += bonus;
            }

            let table = &mut tables[ty * grid + tx];
            let mut cdf = 0.0;
            for (v, bin) in hist.iter().enumerate() {
                cdf += bin;
                table[v] = (cdf * 255.0 / area).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    // Bilinear blend of the four nearest tile tables per pixel.
    let last = (grid - 1) as f32;
    let mut out = vec![0u8; luma.len()];
    for y in 0..height {
        let gy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, last);
        let ty0 = gy.floor() as usize;
        let ty1 = (ty0 + 1).min(grid - 1);
        let fy = gy - ty0 as f32;

        for x in 0..width {
            let gx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, last);
            let tx0 = gx.floor() as usize;
            let tx1 = (tx0 + 1).min(grid - 1);
            let fx = gx - tx0 as f32;

            let v = luma[(y * width + x) as usize] as usize;
            let tl = tables[ty0 * grid + tx0][v] as f32;
            let tr = tables[ty0 * grid + tx1][v] as f32;
            let bl = tables[ty1 * grid + tx0][v] as f32;
            let br = tables[ty1 * grid + tx1][v] as f32;

            let top = tl + (tr - tl) * fx;
            let bottom = bl + (br - bl) * fx;
            out[(y * width + x) as usize] = (top + (bottom - top) * fy).round() as u8;
        }
    }

    Ok(out)
}

/// Encode the final pixel buffer as base64 PNG.
///
/// This is the one stage with no fallback: the transport format is
/// non-negotiable.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, ChartError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ChartError::EncodeFailed {
            detail: e.to_string(),
        })?;

    Ok(STANDARD.encode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn scaled_dimensions_landscape_and_portrait() {
        assert_eq!(scaled_dimensions(4000, 2000, 2048), (2048, 1024));
        assert_eq!(scaled_dimensions(2000, 4000, 2048), (1024, 2048));
        // 3000x2001 → scale 2048/3000; 2001 * 0.68266… = 1366.08 → rounds down
        assert_eq!(scaled_dimensions(3000, 2001, 2048), (2048, 1366));
        // Extreme ratios never collapse to zero.
        assert_eq!(scaled_dimensions(10_000, 1, 2048), (2048, 1));
    }

    #[test]
    fn resize_is_a_no_op_for_small_images() {
        let img = gradient_image(640, 480);
        let resized = resize(img, 2048);
        assert_eq!((resized.width(), resized.height()), (640, 480));
    }

    #[test]
    fn resize_bounds_the_longest_side() {
        let img = gradient_image(400, 200);
        let resized = resize(img, 100);
        assert_eq!((resized.width(), resized.height()), (100, 50));
    }

    #[test]
    fn enhancement_preserves_dimensions() {
        let img = gradient_image(64, 48);
        let enhanced = enhance(img);
        assert_eq!((enhanced.width(), enhanced.height()), (64, 48));
    }

    #[test]
    fn enhancement_handles_tiny_images() {
        // Smaller than the tile grid on both axes.
        let img = gradient_image(3, 3);
        let enhanced = enhance(img);
        assert_eq!((enhanced.width(), enhanced.height()), (3, 3));
    }

    #[test]
    fn clahe_output_covers_full_plane() {
        let luma: Vec<u8> = (0..64u32 * 64).map(|i| (i % 256) as u8).collect();
        let out = clahe(&luma, 64, 64).unwrap();
        assert_eq!(out.len(), luma.len());
    }

    #[test]
    fn encode_produces_decodable_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            10,
            10,
            Rgba([255, 0, 0, 255]),
        ));
        let b64 = encode_png_base64(&img).expect("encode should succeed");
        let bytes = STANDARD.decode(&b64).expect("valid base64");
        let decoded = image::load_from_memory(&bytes).expect("valid PNG");
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn normalize_round_trips_resized_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        gradient_image(300, 150).save(&path).unwrap();

        let config = AnalysisConfig::builder().max_dimension(100).build().unwrap();
        let normalized = normalize(&path, &config).unwrap();
        assert_eq!((normalized.width, normalized.height), (100, 50));

        // Decoding the payload reproduces the pre-enhancement dimensions.
        let bytes = STANDARD.decode(&normalized.base64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn normalize_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.tiff");
        std::fs::write(&path, b"irrelevant").unwrap();

        let err = normalize(&path, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, ChartError::UnsupportedFormat { .. }));
    }

    #[test]
    fn normalize_extension_gate_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.PNG");
        gradient_image(20, 20).save(&path).unwrap();

        let normalized = normalize(&path, &AnalysisConfig::default()).unwrap();
        assert_eq!((normalized.width, normalized.height), (20, 20));
    }

    #[test]
    fn normalize_reports_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        std::fs::write(&path, b"this is not a png").unwrap();

        let err = normalize(&path, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, ChartError::DecodeFailed { .. }));
    }

    #[test]
    fn data_uri_has_png_prefix() {
        let n = NormalizedImage {
            base64: "QUJD".into(),
            width: 1,
            height: 1,
        };
        assert_eq!(n.data_uri(), "data:image/png;base64,QUJD");
    }
}

//! # Normalizer Module
//!
//! Brings every upload to a canonical form before fingerprinting:
//! 1. Decode (zune-jpeg fast path, image crate fallback)
//! 2. Crop transparent margins to the non-zero-alpha bounding box
//! 3. Resize so the larger dimension fits the target canvas
//! 4. Re-encode, keeping the decoded pixels for the hash engine
//!
//! Normalization makes fingerprints comparable across uploads of
//! different original sizes: the same design exported at 1200px and
//! 4000px lands on the same pixels before hashing.

mod decode;

pub use decode::decode_image;

use crate::error::NormalizeError;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Default canvas edge when no template configuration applies
pub const DEFAULT_CANVAS_EDGE: u32 = 3000;

/// Output encoding for normalized bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Target canvas for one template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl Default for CanvasSpec {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_EDGE,
            height: DEFAULT_CANVAS_EDGE,
            format: OutputFormat::Png,
        }
    }
}

/// Maps a template (and optional canvas) to the target normalization
/// spec. The product system implements this against its template
/// configuration tables; the pipeline only consumes it.
pub trait CanvasResolver: Send + Sync {
    fn resolve(
        &self,
        template_id: Option<i64>,
        canvas_id: Option<i64>,
    ) -> Result<CanvasSpec, NormalizeError>;
}

/// Resolver returning the same canvas for every template.
pub struct FixedCanvasResolver {
    spec: CanvasSpec,
}

impl FixedCanvasResolver {
    pub fn new(spec: CanvasSpec) -> Self {
        Self { spec }
    }
}

impl Default for FixedCanvasResolver {
    fn default() -> Self {
        Self::new(CanvasSpec::default())
    }
}

impl CanvasResolver for FixedCanvasResolver {
    fn resolve(
        &self,
        _template_id: Option<i64>,
        _canvas_id: Option<i64>,
    ) -> Result<CanvasSpec, NormalizeError> {
        Ok(self.spec)
    }
}

/// A normalized upload: re-encoded bytes plus the decoded pixels the
/// hash engine needs.
pub struct NormalizedImage {
    /// Re-encoded bytes ready for upload
    pub bytes: Vec<u8>,
    /// Decoded, cropped, resized pixels for fingerprinting
    pub image: DynamicImage,
    /// Output format the bytes were encoded with
    pub format: OutputFormat,
}

/// Crops transparent margins and resizes to the canvas.
pub struct ImageNormalizer;

impl ImageNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one upload against its canvas spec.
    ///
    /// A decode failure on the original upload is a hard per-image
    /// error; a fully transparent image is not (the uncropped original
    /// is used instead).
    pub fn normalize(
        &self,
        content: &[u8],
        file_name: &str,
        canvas: &CanvasSpec,
    ) -> Result<NormalizedImage, NormalizeError> {
        let decoded = decode_image(content, file_name)?;

        let cropped = crop_transparent_margins(&decoded);

        let resized = resize_to_canvas(cropped, canvas);

        let bytes = encode(&resized, canvas.format, file_name)?;

        Ok(NormalizedImage {
            bytes,
            image: resized,
            format: canvas.format,
        })
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Crop to the bounding box of non-zero-alpha pixels.
///
/// Images without an alpha channel pass through untouched, as does a
/// fully transparent image (nothing sensible to crop to).
fn crop_transparent_margins(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return image.clone();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in rgba.enumerate_pixels() {
        if pixel[3] > 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !found {
        // Fully transparent: fall back to the original, uncropped image
        return image.clone();
    }

    if min_x == 0 && min_y == 0 && max_x == width - 1 && max_y == height - 1 {
        return image.clone();
    }

    image.crop_imm(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

/// Shrink so the image fits within the canvas, preserving aspect ratio.
/// Images that already fit are passed through without resampling.
fn resize_to_canvas(image: DynamicImage, canvas: &CanvasSpec) -> DynamicImage {
    let (width, height) = image.dimensions();

    if width <= canvas.width && height <= canvas.height {
        return image;
    }

    // `resize` fits within the bounds while keeping aspect ratio
    image.resize(
        canvas.width,
        canvas.height,
        image::imageops::FilterType::Lanczos3,
    )
}

fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    file_name: &str,
) -> Result<Vec<u8>, NormalizeError> {
    let mut bytes = Vec::new();
    let result = match format {
        OutputFormat::Png => image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png),
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        }
    };

    result.map_err(|e| NormalizeError::EncodeError {
        file_name: file_name.to_string(),
        reason: e.to_string(),
    })?;

    Ok(bytes)
}

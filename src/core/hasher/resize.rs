//! Fast SIMD-accelerated image resizing for the hashing path.
//!
//! Uses fast_image_resize which is 5-14x faster than the image crate's
//! resize and picks AVX2/NEON automatically when available.

use crate::error::HashError;
use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

/// Fast image resizer using SIMD acceleration
pub struct FastResizer {
    resizer: Resizer,
}

impl FastResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    /// Resize an image to the specified dimensions and convert to grayscale.
    ///
    /// This is the common preamble for all the bit hashes: shrink to a
    /// small grid + grayscale conversion.
    pub fn resize_to_grayscale(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<GrayImage, HashError> {
        // Grayscale first; resizing one channel is cheaper than three
        let gray = image.to_luma8();

        let src_width = gray.width();
        let src_height = gray.height();

        if src_width == 0 || src_height == 0 {
            return Err(HashError::InvalidDimensions {
                width: src_width,
                height: src_height,
            });
        }

        if width == 0 || height == 0 {
            return Err(HashError::InvalidDimensions { width, height });
        }

        let src_image = Image::from_vec_u8(src_width, src_height, gray.into_raw(), PixelType::U8)
            .map_err(|e| {
            HashError::ComputationFailed(format!("Failed to create source image: {}", e))
        })?;

        let mut dst_image = Image::new(width, height, PixelType::U8);

        // Bilinear is a good balance of speed and quality for hashing
        let options = ResizeOptions::new().resize_alg(fast_image_resize::ResizeAlg::Convolution(
            fast_image_resize::FilterType::Bilinear,
        ));

        self.resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| HashError::ComputationFailed(format!("Resize failed: {}", e)))?;

        let result_buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
                HashError::ComputationFailed("Failed to create result buffer".to_string())
            })?;

        Ok(result_buffer)
    }
}

impl Default for FastResizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function for one-off resizing
pub fn resize_to_grayscale(
    image: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<GrayImage, HashError> {
    let mut resizer = FastResizer::new();
    resizer.resize_to_grayscale(image, width, height)
}

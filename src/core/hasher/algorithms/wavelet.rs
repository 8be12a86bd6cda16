//! Wavelet Hash (wHash) implementation.
//!
//! wHash works by:
//! 1. Resizing the image to a power-of-two grid (4x the hash size)
//! 2. Running a 2D Haar decomposition until the low-frequency band
//!    is hash_size x hash_size
//! 3. Thresholding the band against its median: above = 1, below = 0
//!
//! The Haar low-pass band captures coarse structure, which makes the
//! hash stable under rescaling and mild compression artifacts.

use super::super::resize::resize_to_grayscale;
use super::super::traits::{HashAlgorithm, HashAlgorithmKind, ImageHashValue};
use crate::error::HashError;
use image::DynamicImage;

/// Wavelet Hash (wHash) implementation using Haar decomposition
pub struct WaveletHasher {
    /// Size of the hash grid (width and height)
    hash_size: u32,
}

impl WaveletHasher {
    pub fn new(hash_size: u32) -> Self {
        Self { hash_size }
    }

    /// One Haar decomposition step over the top-left `size` x `size`
    /// region. Averages land in the first half, details in the second;
    /// only the average (LL) quadrant is carried into the next level.
    fn haar_step(data: &mut [f32], stride: usize, size: usize) {
        let half = size / 2;
        let mut scratch = vec![0f32; size];

        // Rows
        for y in 0..size {
            for x in 0..half {
                let a = data[y * stride + 2 * x];
                let b = data[y * stride + 2 * x + 1];
                scratch[x] = (a + b) / 2.0;
                scratch[half + x] = (a - b) / 2.0;
            }
            data[y * stride..y * stride + size].copy_from_slice(&scratch);
        }

        // Columns
        for x in 0..size {
            for y in 0..half {
                let a = data[(2 * y) * stride + x];
                let b = data[(2 * y + 1) * stride + x];
                scratch[y] = (a + b) / 2.0;
                scratch[half + y] = (a - b) / 2.0;
            }
            for y in 0..size {
                data[y * stride + x] = scratch[y];
            }
        }
    }
}

impl HashAlgorithm for WaveletHasher {
    fn hash_image(&self, image: &DynamicImage) -> Result<ImageHashValue, HashError> {
        let hash_size = self.hash_size as usize;
        if hash_size == 0 {
            return Err(HashError::InvalidDimensions {
                width: self.hash_size,
                height: self.hash_size,
            });
        }

        // Two decomposition levels: start at 4x the target grid
        let scale = self.hash_size * 4;
        let gray = resize_to_grayscale(image, scale, scale)?;

        let stride = scale as usize;
        let mut data: Vec<f32> = gray.pixels().map(|p| p[0] as f32).collect();

        let mut size = stride;
        while size > hash_size {
            Self::haar_step(&mut data, stride, size);
            size /= 2;
        }

        // Low-frequency band is the top-left hash_size x hash_size block
        let mut coefficients = Vec::with_capacity(hash_size * hash_size);
        for y in 0..hash_size {
            for x in 0..hash_size {
                coefficients.push(data[y * stride + x]);
            }
        }

        let mut sorted = coefficients.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = sorted[sorted.len() / 2];

        let mut hash_bytes = Vec::with_capacity(hash_size * hash_size / 8 + 1);
        let mut current_byte: u8 = 0;
        let mut bit_position = 0;

        for &coefficient in &coefficients {
            if coefficient > median {
                current_byte |= 1 << (7 - bit_position);
            }

            bit_position += 1;

            if bit_position == 8 {
                hash_bytes.push(current_byte);
                current_byte = 0;
                bit_position = 0;
            }
        }

        if bit_position > 0 {
            hash_bytes.push(current_byte);
        }

        Ok(ImageHashValue::new(hash_bytes, HashAlgorithmKind::Wavelet))
    }

    fn kind(&self) -> HashAlgorithmKind {
        HashAlgorithmKind::Wavelet
    }
}

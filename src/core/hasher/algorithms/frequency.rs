//! Frequency Hash (pHash) implementation.
//!
//! Uses the Discrete Cosine Transform (DCT) to extract frequency
//! information from the image, making the hash robust to:
//! - Scaling
//! - Brightness/contrast changes
//! - Compression artifacts
//!
//! We use the image_hasher crate's well-tested mean hash with DCT
//! preprocessing rather than hand-rolling the transform.

use super::super::traits::{HashAlgorithm, HashAlgorithmKind, ImageHashValue};
use crate::error::HashError;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig as ImageHasherConfig};

/// Frequency-domain hash (pHash) implementation using DCT
pub struct FrequencyHasher {
    /// Internal hasher from the image_hasher crate
    hasher: image_hasher::Hasher,
}

impl FrequencyHasher {
    pub fn new(hash_size: u32) -> Self {
        let hasher = ImageHasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Mean)
            .preproc_dct() // classic pHash: mean hash over DCT low frequencies
            .to_hasher();

        Self { hasher }
    }
}

impl HashAlgorithm for FrequencyHasher {
    fn hash_image(&self, image: &DynamicImage) -> Result<ImageHashValue, HashError> {
        let hash = self.hasher.hash_image(image);
        let bytes = hash.as_bytes().to_vec();

        Ok(ImageHashValue::new(bytes, HashAlgorithmKind::Frequency))
    }

    fn kind(&self) -> HashAlgorithmKind {
        HashAlgorithmKind::Frequency
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::traits::PerceptualHash;
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn create_test_image(shift: u8) -> DynamicImage {
        let img = ImageBuffer::from_fn(100, 100, |x, y| {
            let v = ((x * 2 + y) % 256) as u8;
            Rgb([
                v.saturating_add(shift),
                v.saturating_add(shift),
                v.saturating_add(shift),
            ])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn identical_images_produce_identical_hash() {
        let hasher = FrequencyHasher::new(16);
        let image = create_test_image(0);

        let hash1 = hasher.hash_image(&image).unwrap();
        let hash2 = hasher.hash_image(&image).unwrap();

        assert_eq!(hash1.distance(&hash2), 0);
    }

    #[test]
    fn hash_is_256_bits_at_size_16() {
        let hasher = FrequencyHasher::new(16);
        let hash = hasher.hash_image(&create_test_image(0)).unwrap();
        assert_eq!(hash.bit_count(), 256);
    }

    #[test]
    fn brightness_shift_produces_similar_hash() {
        let hasher = FrequencyHasher::new(16);

        let hash1 = hasher.hash_image(&create_test_image(0)).unwrap();
        let hash2 = hasher.hash_image(&create_test_image(5)).unwrap();

        assert!(hash1.distance(&hash2) < 16);
    }

    #[test]
    fn kind_returns_frequency() {
        let hasher = FrequencyHasher::new(16);
        assert_eq!(hasher.kind(), HashAlgorithmKind::Frequency);
    }
}

//! Trait definitions for perceptual hashing.

use crate::error::HashError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A computed perceptual hash that can be compared
pub trait PerceptualHash: Clone + Send + Sync {
    /// Compute the Hamming distance to another hash
    ///
    /// Returns the number of bits that differ between the two hashes.
    /// Lower distance = more similar images.
    fn distance(&self, other: &Self) -> u32;

    /// Get the raw hash bytes
    fn as_bytes(&self) -> &[u8];

    /// Get the hash as a hexadecimal string
    fn to_hex(&self) -> String {
        self.as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Get the total number of bits in this hash
    fn bit_count(&self) -> u32 {
        (self.as_bytes().len() * 8) as u32
    }
}

/// The four fingerprint algorithms computed per image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithmKind {
    /// Average Hash (aHash) - brightness relative to the mean
    Average,
    /// Difference Hash (dHash) - horizontal brightness gradients
    Difference,
    /// Wavelet Hash (wHash) - Haar decomposition, robust to scaling
    Wavelet,
    /// Frequency Hash (pHash) - DCT-based, robust to edits
    Frequency,
}

impl HashAlgorithmKind {
    /// All kinds, in the order fingerprints are stored and compared
    pub const ALL: [HashAlgorithmKind; 4] = [
        HashAlgorithmKind::Average,
        HashAlgorithmKind::Difference,
        HashAlgorithmKind::Wavelet,
        HashAlgorithmKind::Frequency,
    ];
}

impl std::fmt::Display for HashAlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithmKind::Average => write!(f, "aHash"),
            HashAlgorithmKind::Difference => write!(f, "dHash"),
            HashAlgorithmKind::Wavelet => write!(f, "wHash"),
            HashAlgorithmKind::Frequency => write!(f, "pHash"),
        }
    }
}

/// Trait for hash algorithm implementations
pub trait HashAlgorithm: Send + Sync {
    /// Compute a hash from a decoded, normalized image
    fn hash_image(&self, image: &DynamicImage) -> Result<ImageHashValue, HashError>;

    /// Get the algorithm kind
    fn kind(&self) -> HashAlgorithmKind;
}

/// Concrete hash value type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageHashValue {
    /// The raw hash bytes
    bytes: Vec<u8>,
    /// The algorithm that produced this hash
    algorithm: HashAlgorithmKind,
}

impl ImageHashValue {
    /// Create a new hash value
    pub fn new(bytes: Vec<u8>, algorithm: HashAlgorithmKind) -> Self {
        Self { bytes, algorithm }
    }

    /// Parse a hash back from its hexadecimal string form.
    ///
    /// The catalog store keeps hashes as hex strings; fuzzy comparison
    /// needs the bits back.
    pub fn from_hex(hex: &str, algorithm: HashAlgorithmKind) -> Result<Self, HashError> {
        if hex.is_empty() || hex.len() % 2 != 0 {
            return Err(HashError::MalformedHash(hex.to_string()));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| HashError::MalformedHash(hex.to_string()))?;
        Ok(Self { bytes, algorithm })
    }

    /// Get the algorithm that produced this hash
    pub fn algorithm(&self) -> HashAlgorithmKind {
        self.algorithm
    }
}

impl PerceptualHash for ImageHashValue {
    fn distance(&self, other: &Self) -> u32 {
        // Hashes of different sizes are never near
        if self.bytes.len() != other.bytes.len() {
            return self.bit_count().max(other.bit_count());
        }
        // Hamming distance: count differing bits
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_hash(bytes: &[u8]) -> ImageHashValue {
        ImageHashValue::new(bytes.to_vec(), HashAlgorithmKind::Difference)
    }

    #[test]
    fn distance_to_self_is_zero() {
        let hash = create_test_hash(&[0xFF, 0x00, 0xAA, 0x55]);
        assert_eq!(hash.distance(&hash), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let hash_a = create_test_hash(&[0xFF, 0x00]);
        let hash_b = create_test_hash(&[0x00, 0xFF]);

        assert_eq!(hash_a.distance(&hash_b), hash_b.distance(&hash_a));
    }

    #[test]
    fn distance_counts_differing_bits() {
        let hash_a = create_test_hash(&[0b11111111]);
        let hash_b = create_test_hash(&[0b00000000]);

        assert_eq!(hash_a.distance(&hash_b), 8);
    }

    #[test]
    fn unequal_lengths_are_maximally_distant() {
        let full = create_test_hash(&[0xAA; 32]);
        let short = create_test_hash(&[0xAA]);

        assert_eq!(full.distance(&short), 256);
        assert_eq!(short.distance(&full), 256);
    }

    #[test]
    fn to_hex_produces_correct_string() {
        let hash = create_test_hash(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(hash.to_hex(), "deadbeef");
    }

    #[test]
    fn hex_round_trips() {
        let hash = create_test_hash(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
        let parsed =
            ImageHashValue::from_hex(&hash.to_hex(), HashAlgorithmKind::Difference).unwrap();
        assert_eq!(parsed.as_bytes(), hash.as_bytes());
        assert_eq!(hash.distance(&parsed), 0);
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(ImageHashValue::from_hex("", HashAlgorithmKind::Average).is_err());
        assert!(ImageHashValue::from_hex("abc", HashAlgorithmKind::Average).is_err());
        assert!(ImageHashValue::from_hex("zz", HashAlgorithmKind::Average).is_err());
    }

    #[test]
    fn algorithm_kind_display() {
        assert_eq!(HashAlgorithmKind::Average.to_string(), "aHash");
        assert_eq!(HashAlgorithmKind::Difference.to_string(), "dHash");
        assert_eq!(HashAlgorithmKind::Wavelet.to_string(), "wHash");
        assert_eq!(HashAlgorithmKind::Frequency.to_string(), "pHash");
    }
}

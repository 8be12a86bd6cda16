//! The four-algorithm fingerprint of one normalized image.
//!
//! All four hashes are computed from a single decode so the fingerprint
//! is a pure function of the normalized pixels. Pairwise comparison uses
//! voting: per-algorithm Hamming distances are taken independently and a
//! candidate only counts as a duplicate when enough algorithms agree.
//! Consensus keeps one algorithm's quirks from producing false positives.

use super::traits::{HashAlgorithmKind, ImageHashValue, PerceptualHash};
use serde::{Deserialize, Serialize};

/// The four perceptual hashes of one normalized image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintSet {
    /// Average hash (aHash)
    pub average: ImageHashValue,
    /// Difference hash (dHash)
    pub difference: ImageHashValue,
    /// Wavelet hash (wHash)
    pub wavelet: ImageHashValue,
    /// Frequency hash (pHash)
    pub frequency: ImageHashValue,
}

impl FingerprintSet {
    pub fn new(
        average: ImageHashValue,
        difference: ImageHashValue,
        wavelet: ImageHashValue,
        frequency: ImageHashValue,
    ) -> Self {
        Self {
            average,
            difference,
            wavelet,
            frequency,
        }
    }

    /// The hash produced by one algorithm
    pub fn get(&self, kind: HashAlgorithmKind) -> &ImageHashValue {
        match kind {
            HashAlgorithmKind::Average => &self.average,
            HashAlgorithmKind::Difference => &self.difference,
            HashAlgorithmKind::Wavelet => &self.wavelet,
            HashAlgorithmKind::Frequency => &self.frequency,
        }
    }

    /// All four hashes as hex strings, in `HashAlgorithmKind::ALL` order
    pub fn hex_strings(&self) -> [(HashAlgorithmKind, String); 4] {
        HashAlgorithmKind::ALL.map(|kind| (kind, self.get(kind).to_hex()))
    }

    /// Compare two fingerprints and return the per-algorithm breakdown
    pub fn compare(&self, other: &FingerprintSet, threshold: u32) -> FingerprintCompareResult {
        let average_distance = self.average.distance(&other.average);
        let difference_distance = self.difference.distance(&other.difference);
        let wavelet_distance = self.wavelet.distance(&other.wavelet);
        let frequency_distance = self.frequency.distance(&other.frequency);

        let votes = (average_distance <= threshold) as u8
            + (difference_distance <= threshold) as u8
            + (wavelet_distance <= threshold) as u8
            + (frequency_distance <= threshold) as u8;

        FingerprintCompareResult {
            average_distance,
            difference_distance,
            wavelet_distance,
            frequency_distance,
            votes,
        }
    }

    /// Quorum check: duplicate iff at least `min_matches` algorithms agree
    pub fn is_duplicate_of(&self, other: &FingerprintSet, threshold: u32, min_matches: u8) -> bool {
        self.compare(other, threshold).votes >= min_matches
    }
}

/// Per-algorithm distances between two fingerprints
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FingerprintCompareResult {
    pub average_distance: u32,
    pub difference_distance: u32,
    pub wavelet_distance: u32,
    pub frequency_distance: u32,
    /// How many algorithms landed within the threshold
    pub votes: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(bytes: &[u8], kind: HashAlgorithmKind) -> ImageHashValue {
        ImageHashValue::new(bytes.to_vec(), kind)
    }

    fn fingerprint(a: &[u8], d: &[u8], w: &[u8], f: &[u8]) -> FingerprintSet {
        FingerprintSet::new(
            hash(a, HashAlgorithmKind::Average),
            hash(d, HashAlgorithmKind::Difference),
            hash(w, HashAlgorithmKind::Wavelet),
            hash(f, HashAlgorithmKind::Frequency),
        )
    }

    #[test]
    fn identical_fingerprints_get_four_votes() {
        let fp = fingerprint(&[0xAA], &[0xBB], &[0xCC], &[0xDD]);
        let result = fp.compare(&fp, 0);

        assert_eq!(result.votes, 4);
        assert_eq!(result.average_distance, 0);
    }

    #[test]
    fn quorum_requires_min_matches() {
        let a = fingerprint(&[0x00], &[0x00], &[0x00], &[0x00]);
        // Two hashes identical, two maximally different
        let b = fingerprint(&[0x00], &[0x00], &[0xFF], &[0xFF]);

        assert!(a.is_duplicate_of(&b, 2, 2));
        assert!(!a.is_duplicate_of(&b, 2, 3));
    }

    #[test]
    fn one_agreeing_algorithm_is_not_a_duplicate() {
        let a = fingerprint(&[0x00], &[0x00], &[0x00], &[0x00]);
        let b = fingerprint(&[0x00], &[0xFF], &[0xFF], &[0xFF]);

        let result = a.compare(&b, 2);
        assert_eq!(result.votes, 1);
        assert!(!a.is_duplicate_of(&b, 2, 2));
    }

    #[test]
    fn threshold_is_inclusive() {
        let a = fingerprint(&[0b0000_0000], &[0x00], &[0x00], &[0x00]);
        let b = fingerprint(&[0b0000_0011], &[0x00], &[0x00], &[0x00]);

        // aHash distance is exactly 2
        let result = a.compare(&b, 2);
        assert_eq!(result.average_distance, 2);
        assert_eq!(result.votes, 4);

        let result = a.compare(&b, 1);
        assert_eq!(result.votes, 3);
    }

    #[test]
    fn hex_strings_follow_algorithm_order() {
        let fp = fingerprint(&[0x01], &[0x02], &[0x03], &[0x04]);
        let strings = fp.hex_strings();

        assert_eq!(strings[0], (HashAlgorithmKind::Average, "01".to_string()));
        assert_eq!(strings[3], (HashAlgorithmKind::Frequency, "04".to_string()));
    }
}

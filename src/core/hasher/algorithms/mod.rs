//! The four fingerprint algorithm implementations.

mod average;
mod difference;
mod frequency;
mod wavelet;

pub use average::AverageHasher;
pub use difference::DifferenceHasher;
pub use frequency::FrequencyHasher;
pub use wavelet::WaveletHasher;

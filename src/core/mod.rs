//! # Core Module
//!
//! The UI-agnostic ingestion engine.
//!
//! ## Modules
//! - `model` - Input, work-in-progress, and result records
//! - `normalizer` - Alpha crop + canvas resize before hashing
//! - `hasher` - Computes the four perceptual fingerprints
//! - `dedup` - Duplicate detection against run-local and stored hashes
//! - `batch` - Batch splitting and sequential name allocation
//! - `storage` - Object-store interface and bounded parallel uploader
//! - `persist` - Catalog store interface and batch-atomic bulk writes
//! - `pipeline` - Orchestrates the full workflow

pub mod batch;
pub mod dedup;
pub mod hasher;
pub mod model;
pub mod normalizer;
pub mod persist;
pub mod pipeline;
pub mod storage;

// Re-export commonly used types
pub use batch::{BatchSplitter, SequenceAllocator};
pub use dedup::{DedupConfig, DuplicateDetector, DuplicateVerdict};
pub use hasher::{FingerprintEngine, FingerprintSet, HashAlgorithmKind, PerceptualHash};
pub use model::{BatchResult, ProcessedImage, Stage, UploadedImage, WorkflowResult};
pub use normalizer::{CanvasResolver, CanvasSpec, FixedCanvasResolver, ImageNormalizer};
pub use persist::{CatalogStore, PersistenceWriter};
pub use storage::{ObjectStore, StorageUploader};

//! # Catalog Ingest
//!
//! Bulk image ingestion pipeline for print-on-demand catalogs.
//!
//! ## What It Does
//! Given a batch of raw uploaded images, the pipeline normalizes each one
//! (alpha crop + canvas resize), computes four perceptual fingerprints,
//! rejects near-duplicates of designs the user already has (stored or seen
//! earlier in the same run), assigns gap-free sequential output names to
//! the survivors, pushes the processed bytes to object storage, and records
//! catalog rows with one bulk insert per batch.
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and support layers:
//! - `core` - The ingestion engine (normalizer, hasher, dedup, batching,
//!   storage, persistence, pipeline orchestration)
//! - `events` - Event-driven progress reporting (UI-ready)
//! - `error` - Error types per failure domain

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use crate::core::model::{BatchResult, ProcessedImage, UploadedImage, WorkflowResult};
pub use crate::core::pipeline::{
    CancellationToken, IngestConfig, IngestPipeline, IngestPipelineBuilder,
};
pub use error::{IngestError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}

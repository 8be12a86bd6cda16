//! Input, work-in-progress, and result records for the pipeline.

use crate::core::hasher::FingerprintSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One caller-supplied upload. Immutable after construction.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Original filename as uploaded
    pub file_name: String,
    /// Raw byte content
    pub content: Vec<u8>,
    /// Length of `content`, kept separately for batch splitting
    pub byte_len: usize,
    /// Owning user
    pub user_id: i64,
    /// Target product template, when the caller knows it
    pub template_id: Option<i64>,
    /// Locally generated temporary identifier
    pub temp_id: Uuid,
}

impl UploadedImage {
    /// Wrap one uploaded file
    pub fn new(
        file_name: impl Into<String>,
        content: Vec<u8>,
        user_id: i64,
        template_id: Option<i64>,
    ) -> Self {
        let byte_len = content.len();
        Self {
            file_name: file_name.into(),
            content,
            byte_len,
            user_id,
            template_id,
            temp_id: Uuid::new_v4(),
        }
    }
}

/// Stages an image moves through, strictly in order.
///
/// Duplicates stop at `Deduplicated`; errored images stop wherever the
/// error occurred. `Renamed` and beyond are reserved for unique images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Received,
    Normalized,
    Hashed,
    Deduplicated,
    Renamed,
    Uploaded,
    Persisted,
}

impl Stage {
    /// The stage that directly follows this one
    pub fn successor(&self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::Normalized),
            Stage::Normalized => Some(Stage::Hashed),
            Stage::Hashed => Some(Stage::Deduplicated),
            Stage::Deduplicated => Some(Stage::Renamed),
            Stage::Renamed => Some(Stage::Uploaded),
            Stage::Uploaded => Some(Stage::Persisted),
            Stage::Persisted => None,
        }
    }
}

/// Mutable work record for one upload moving through the pipeline.
///
/// Owned exclusively by the batch worker processing it; never shared
/// across batches. Once `error` is set, later stages must not touch the
/// record except for accounting.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// The original upload
    pub upload: UploadedImage,
    /// Current pipeline stage
    stage: Stage,
    /// Normalized, re-encoded bytes (set by the normalizer)
    pub normalized_bytes: Option<Vec<u8>>,
    /// The four perceptual fingerprints (set by the hasher)
    pub fingerprints: Option<FingerprintSet>,
    /// Assigned final filename (unique images only)
    pub final_name: Option<String>,
    /// Object-store path the bytes were written to
    pub storage_path: Option<String>,
    /// Matched an image accepted earlier in this run
    pub is_duplicate_local: bool,
    /// Matched a design already recorded in the catalog store
    pub is_duplicate_db: bool,
    /// First error encountered, if any
    pub error: Option<String>,
    /// Bytes reached the object store
    pub uploaded: bool,
    /// Catalog row was committed
    pub persisted: bool,
}

impl ProcessedImage {
    pub fn new(upload: UploadedImage) -> Self {
        Self {
            upload,
            stage: Stage::Received,
            normalized_bytes: None,
            fingerprints: None,
            final_name: None,
            storage_path: None,
            is_duplicate_local: false,
            is_duplicate_db: false,
            error: None,
            uploaded: false,
            persisted: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Advance to `next` iff it directly follows the current stage and
    /// the record is not errored. Returns whether the advance happened.
    pub fn advance_to(&mut self, next: Stage) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.stage.successor() == Some(next) {
            self.stage = next;
            true
        } else {
            false
        }
    }

    /// Record a per-image error. The record is excluded from all later
    /// stages; only accounting may look at it afterwards.
    pub fn set_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_duplicate(&self) -> bool {
        self.is_duplicate_local || self.is_duplicate_db
    }

    /// Unique, error-free images are the only ones renamed and uploaded
    pub fn is_unique(&self) -> bool {
        !self.is_duplicate() && !self.has_error()
    }
}

/// Immutable summary of one batch. Produced once per batch, consumed
/// only by the result aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    /// Index of this batch in submission order
    pub batch_index: usize,
    /// Images accepted, renamed, uploaded
    pub processed: usize,
    /// Images skipped as within-run duplicates
    pub skipped_local: usize,
    /// Images skipped as already-stored duplicates
    pub skipped_db: usize,
    /// Images that errored
    pub errors: usize,
    /// Successful object-store uploads
    pub uploads: usize,
    /// Catalog rows committed
    pub db_updates: usize,
    /// Elapsed wall time for this batch in milliseconds
    pub duration_ms: u64,
    /// Error detail strings, one per failed image or batch failure
    pub error_messages: Vec<String>,
}

/// The final, caller-visible aggregate across all batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub processed_images: usize,
    pub skipped_duplicates_local: usize,
    pub skipped_duplicates_db: usize,
    pub errors: usize,
    pub storage_uploads: usize,
    pub db_updates: usize,
    /// Total wall time for the run in milliseconds
    pub duration_ms: u64,
    /// Error detail strings surfaced from every batch
    pub error_messages: Vec<String>,
    /// Per-batch summaries, in submission order
    pub batches: Vec<BatchResult>,
}

impl WorkflowResult {
    /// Sum per-batch results into the final report.
    pub fn aggregate(mut batches: Vec<BatchResult>, duration_ms: u64) -> Self {
        batches.sort_by_key(|b| b.batch_index);

        let mut result = WorkflowResult {
            duration_ms,
            ..Default::default()
        };
        for batch in &batches {
            result.processed_images += batch.processed;
            result.skipped_duplicates_local += batch.skipped_local;
            result.skipped_duplicates_db += batch.skipped_db;
            result.errors += batch.errors;
            result.storage_uploads += batch.uploads;
            result.db_updates += batch.db_updates;
            result
                .error_messages
                .extend(batch.error_messages.iter().cloned());
        }
        result.batches = batches;
        result
    }

    /// Total images that went in, however they came out
    pub fn total_images(&self) -> usize {
        self.processed_images
            + self.skipped_duplicates_local
            + self.skipped_duplicates_db
            + self.errors
    }
}

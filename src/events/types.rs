//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};

/// All events emitted by the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    /// Pipeline-level events
    Pipeline(PipelineEvent),
    /// Per-batch events
    Batch(BatchEvent),
    /// Coarse progress updates for UI display
    Progress(ProgressUpdate),
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Run has started
    Started {
        total_images: usize,
        total_batches: usize,
    },
    /// Run completed
    Completed { summary: RunSummary },
    /// Run was cancelled; completed batches remain valid
    Cancelled { remaining_batches: usize },
}

/// Events emitted while processing one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    /// Batch picked up by a worker
    Started { batch: usize, images: usize },
    /// An image was normalized and fingerprinted
    ImageHashed { batch: usize, file_name: String },
    /// An image was skipped as a duplicate
    DuplicateSkipped {
        batch: usize,
        file_name: String,
        scope: DuplicateScope,
    },
    /// An image failed; processing of the batch continues
    ImageError {
        batch: usize,
        file_name: String,
        message: String,
    },
    /// Processed bytes reached the object store
    Uploaded { batch: usize, file_name: String },
    /// Catalog rows for the batch were written
    Persisted { batch: usize, rows: usize },
    /// The whole batch failed; all of its images count as errors
    Failed { batch: usize, message: String },
    /// Batch finished
    Completed {
        batch: usize,
        processed: usize,
        skipped: usize,
        errors: usize,
    },
}

/// Where a duplicate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateScope {
    /// Matched an image accepted earlier in the same run
    Local,
    /// Matched a design already recorded in the catalog store
    Store,
}

/// A coarse progress update suitable for a progress bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: IngestStage,
    /// Human-readable status message
    pub message: String,
    /// File currently being processed, when known
    pub current_file: Option<String>,
    /// Estimated completion in [0.0, 1.0]
    pub fraction: f32,
}

/// Stages of the ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestStage {
    Splitting,
    Hashing,
    Deduplicating,
    Uploading,
    Persisting,
    Finalizing,
}

impl IngestStage {
    /// Coarse stage number for UI consumers that want ordinals
    pub fn number(&self) -> u8 {
        match self {
            IngestStage::Splitting => 1,
            IngestStage::Hashing => 2,
            IngestStage::Deduplicating => 3,
            IngestStage::Uploading => 4,
            IngestStage::Persisting => 5,
            IngestStage::Finalizing => 6,
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestStage::Splitting => write!(f, "Splitting"),
            IngestStage::Hashing => write!(f, "Hashing"),
            IngestStage::Deduplicating => write!(f, "Deduplicating"),
            IngestStage::Uploading => write!(f, "Uploading"),
            IngestStage::Persisting => write!(f, "Persisting"),
            IngestStage::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Images accepted, renamed, uploaded
    pub processed_images: usize,
    /// Images skipped as within-run duplicates
    pub skipped_local: usize,
    /// Images skipped as already-stored duplicates
    pub skipped_store: usize,
    /// Images that errored
    pub errors: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = IngestEvent::Progress(ProgressUpdate {
            stage: IngestStage::Hashing,
            message: "Fingerprinting uploads".to_string(),
            current_file: Some("shirt.png".to_string()),
            fraction: 0.25,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: IngestEvent = serde_json::from_str(&json).unwrap();

        match deserialized {
            IngestEvent::Progress(p) => {
                assert_eq!(p.stage, IngestStage::Hashing);
                assert_eq!(p.current_file.as_deref(), Some("shirt.png"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn stage_numbers_are_ordered() {
        assert_eq!(IngestStage::Splitting.number(), 1);
        assert_eq!(IngestStage::Finalizing.number(), 6);
        assert!(IngestStage::Hashing.number() < IngestStage::Uploading.number());
    }

    #[test]
    fn run_summary_is_serializable() {
        let summary = RunSummary {
            processed_images: 480,
            skipped_local: 12,
            skipped_store: 8,
            errors: 0,
            duration_ms: 93_000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("93000"));
    }
}

//! # Pipeline Module
//!
//! The top-level ingestion pipeline: splits uploads into batches,
//! processes batches on a bounded rayon pool, and aggregates the
//! per-batch results into one `WorkflowResult`.
//!
//! All run-scoped state (sequence allocator, dedup reference sets,
//! name caches, persistence write lock) lives for exactly one run and
//! is shared by every batch worker.

mod processor;

use crate::core::batch::{
    BatchSplitter, SequenceAllocator, DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_COUNT,
    DEFAULT_SEQUENCE_START,
};
use crate::core::dedup::{DedupConfig, DuplicateDetector};
use crate::core::hasher::FingerprintEngine;
use crate::core::model::{UploadedImage, WorkflowResult};
use crate::core::normalizer::{CanvasResolver, CanvasSpec, FixedCanvasResolver, ImageNormalizer};
use crate::core::persist::{CatalogStore, NameCaches, PersistenceWriter};
use crate::core::storage::{ObjectStore, StorageUploader, DEFAULT_MAX_PARALLEL_UPLOADS};
use crate::error::{IngestError, Result};
use crate::events::{
    null_sender, EventSender, IngestEvent, IngestStage, PipelineEvent, ProgressUpdate, RunSummary,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Cooperative cancellation flag, checked before each batch starts.
/// Batches already in flight run to completion.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Tunable knobs of one pipeline instance.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Target canvas for the default resolver
    pub canvas: CanvasSpec,
    /// Byte ceiling per batch
    pub max_batch_bytes: usize,
    /// Image-count ceiling per batch
    pub max_batch_count: usize,
    /// Duplicate-detection thresholds
    pub dedup: DedupConfig,
    /// First sequential output index
    pub sequence_start: u64,
    /// Cap on concurrent batch workers
    pub max_threads: usize,
    /// Cap on concurrent object-store puts
    pub max_parallel_uploads: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasSpec::default(),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            dedup: DedupConfig::default(),
            sequence_start: DEFAULT_SEQUENCE_START,
            max_threads: 4,
            max_parallel_uploads: DEFAULT_MAX_PARALLEL_UPLOADS,
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> Result<()> {
        if self.max_batch_bytes == 0 {
            return Err(IngestError::Config("max_batch_bytes must be > 0".into()));
        }
        if self.max_batch_count == 0 {
            return Err(IngestError::Config("max_batch_count must be > 0".into()));
        }
        if self.max_threads == 0 {
            return Err(IngestError::Config("max_threads must be > 0".into()));
        }
        if self.max_parallel_uploads == 0 {
            return Err(IngestError::Config(
                "max_parallel_uploads must be > 0".into(),
            ));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(IngestError::Config("canvas must be non-empty".into()));
        }
        if self.dedup.min_matches == 0 || self.dedup.min_matches > 4 {
            return Err(IngestError::Config("min_matches must be in 1..=4".into()));
        }
        Ok(())
    }
}

type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Fans events out to the channel and coarse progress to the caller's
/// callback. Delivery is best-effort on both paths.
pub(crate) struct Emitter {
    events: EventSender,
    progress: Option<ProgressCallback>,
}

impl Emitter {
    pub(crate) fn send(&self, event: IngestEvent) {
        if let (Some(callback), IngestEvent::Progress(update)) = (&self.progress, &event) {
            // The callback belongs to the caller. A panic inside it
            // must not take down the batch worker it runs on.
            let update = update.clone();
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(update))).is_err()
            {
                warn!("progress callback panicked, update dropped");
            }
        }
        self.events.send(event);
    }
}

/// Run-scoped shared state, torn down when `run` returns.
pub(crate) struct RunState {
    pub normalizer: ImageNormalizer,
    pub engine: FingerprintEngine,
    pub detector: DuplicateDetector,
    pub allocator: SequenceAllocator,
    pub caches: NameCaches,
    pub writer: PersistenceWriter,
    pub uploader: StorageUploader,
    pub store: Arc<dyn CatalogStore>,
    pub resolver: Arc<dyn CanvasResolver>,
    pub total_images: usize,
    pub hashed: AtomicUsize,
}

/// Builder for [`IngestPipeline`].
pub struct IngestPipelineBuilder {
    config: IngestConfig,
    catalog: Option<Arc<dyn CatalogStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
    resolver: Option<Arc<dyn CanvasResolver>>,
    token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl IngestPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            catalog: None,
            objects: None,
            resolver: None,
            token: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(store);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(store);
        self
    }

    /// Override the default fixed-canvas resolver
    pub fn canvas_resolver(mut self, resolver: Arc<dyn CanvasResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Coarse progress callback for UI consumers that do not want to
    /// drain the event channel
    pub fn on_progress(mut self, callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<IngestPipeline> {
        self.config.validate()?;

        let catalog = self
            .catalog
            .ok_or_else(|| IngestError::Config("a catalog store is required".into()))?;
        let objects = self
            .objects
            .ok_or_else(|| IngestError::Config("an object store is required".into()))?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FixedCanvasResolver::new(self.config.canvas)));

        Ok(IngestPipeline {
            config: self.config,
            catalog,
            objects,
            resolver,
            token: self.token,
            progress: self.progress,
        })
    }
}

impl Default for IngestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The bulk image ingestion pipeline.
pub struct IngestPipeline {
    config: IngestConfig,
    catalog: Arc<dyn CatalogStore>,
    objects: Arc<dyn ObjectStore>,
    resolver: Arc<dyn CanvasResolver>,
    token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl IngestPipeline {
    pub fn builder() -> IngestPipelineBuilder {
        IngestPipelineBuilder::new()
    }

    /// Process one upload set without event reporting.
    pub fn run(&self, uploads: Vec<UploadedImage>) -> Result<WorkflowResult> {
        self.run_with_events(uploads, &null_sender())
    }

    /// Process one upload set, reporting progress on `events`.
    pub fn run_with_events(
        &self,
        uploads: Vec<UploadedImage>,
        events: &EventSender,
    ) -> Result<WorkflowResult> {
        if self.token.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let started = Instant::now();
        let total_images = uploads.len();
        let emitter = Emitter {
            events: events.clone(),
            progress: self.progress.clone(),
        };

        emitter.send(IngestEvent::Progress(ProgressUpdate {
            stage: IngestStage::Splitting,
            message: format!("Splitting {total_images} uploads into batches"),
            current_file: None,
            fraction: 0.0,
        }));

        let splitter = BatchSplitter::new(self.config.max_batch_bytes, self.config.max_batch_count);
        let batches = splitter.split(uploads);
        let total_batches = batches.len();
        info!(total_images, total_batches, "run started");

        emitter.send(IngestEvent::Pipeline(PipelineEvent::Started {
            total_images,
            total_batches,
        }));

        let state = RunState {
            normalizer: ImageNormalizer::new(),
            engine: FingerprintEngine::default(),
            detector: DuplicateDetector::new(self.config.dedup, self.catalog.clone()),
            allocator: SequenceAllocator::new(self.config.sequence_start),
            caches: NameCaches::new(),
            writer: PersistenceWriter::new(self.catalog.clone()),
            uploader: StorageUploader::with_parallelism(
                self.objects.clone(),
                self.config.max_parallel_uploads,
            )?,
            store: self.catalog.clone(),
            resolver: self.resolver.clone(),
            total_images,
            hashed: AtomicUsize::new(0),
        };

        let workers = self.config.max_threads.min(total_batches).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ingest-batch-{i}"))
            .build()
            .map_err(|e| IngestError::Config(format!("batch pool: {e}")))?;

        let cancelled_batches = AtomicUsize::new(0);
        let results = pool.install(|| {
            batches
                .into_par_iter()
                .enumerate()
                .map(|(index, batch)| {
                    if self.token.is_cancelled() {
                        cancelled_batches.fetch_add(1, Ordering::SeqCst);
                        processor::cancelled_batch(index, &batch, &emitter)
                    } else {
                        processor::process_batch(&state, index, batch, &emitter)
                    }
                })
                .collect::<Vec<_>>()
        });

        let remaining = cancelled_batches.load(Ordering::SeqCst);
        if remaining > 0 {
            warn!(remaining, "run cancelled");
            emitter.send(IngestEvent::Pipeline(PipelineEvent::Cancelled {
                remaining_batches: remaining,
            }));
        }

        let result = WorkflowResult::aggregate(results, started.elapsed().as_millis() as u64);

        emitter.send(IngestEvent::Progress(ProgressUpdate {
            stage: IngestStage::Finalizing,
            message: format!(
                "Processed {}, skipped {}, errors {}",
                result.processed_images,
                result.skipped_duplicates_local + result.skipped_duplicates_db,
                result.errors
            ),
            current_file: None,
            fraction: 1.0,
        }));
        emitter.send(IngestEvent::Pipeline(PipelineEvent::Completed {
            summary: RunSummary {
                processed_images: result.processed_images,
                skipped_local: result.skipped_duplicates_local,
                skipped_store: result.skipped_duplicates_db,
                errors: result.errors,
                duration_ms: result.duration_ms,
            },
        }));
        info!(
            processed = result.processed_images,
            skipped_local = result.skipped_duplicates_local,
            skipped_store = result.skipped_duplicates_db,
            errors = result.errors,
            ms = result.duration_ms,
            "run finished"
        );

        Ok(result)
    }
}

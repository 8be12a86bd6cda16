//! Per-batch processing: normalize, fingerprint, dedup, rename,
//! upload, persist. Runs on one batch-pool worker per batch.

use super::{Emitter, RunState};
use crate::core::dedup::DuplicateVerdict;
use crate::core::model::{BatchResult, ProcessedImage, Stage, UploadedImage};
use crate::core::normalizer::OutputFormat;
use crate::events::{BatchEvent, DuplicateScope, IngestEvent, IngestStage, ProgressUpdate};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info_span, warn};

/// Process one batch end to end and summarize it.
pub(super) fn process_batch(
    state: &RunState,
    batch_index: usize,
    uploads: Vec<UploadedImage>,
    emitter: &Emitter,
) -> BatchResult {
    let _span = info_span!("batch", index = batch_index).entered();
    let started = Instant::now();

    emitter.send(IngestEvent::Batch(BatchEvent::Started {
        batch: batch_index,
        images: uploads.len(),
    }));

    let mut images: Vec<ProcessedImage> = uploads.into_iter().map(ProcessedImage::new).collect();
    // Output format per image, fixed by the canvas its template resolves to
    let mut formats: Vec<OutputFormat> = Vec::with_capacity(images.len());

    // Normalize and fingerprint sequentially, in submission order, so
    // that within-batch duplicate resolution is deterministic.
    for image in images.iter_mut() {
        let format = normalize_and_hash(state, batch_index, image, emitter);
        formats.push(format);
    }

    stage_progress(state, IngestStage::Deduplicating, batch_index, emitter);
    deduplicate(state, batch_index, &mut images, emitter);
    rename(state, &mut images, &formats);

    stage_progress(state, IngestStage::Uploading, batch_index, emitter);
    let uploads_done = state.uploader.upload_batch(&mut images);
    for image in images.iter().filter(|i| i.uploaded) {
        emitter.send(IngestEvent::Batch(BatchEvent::Uploaded {
            batch: batch_index,
            file_name: image.upload.file_name.clone(),
        }));
    }

    stage_progress(state, IngestStage::Persisting, batch_index, emitter);
    let db_updates = state.writer.persist_batch(&mut images, &state.caches);
    emitter.send(IngestEvent::Batch(BatchEvent::Persisted {
        batch: batch_index,
        rows: db_updates,
    }));

    let result = summarize(batch_index, &images, uploads_done, db_updates, started);
    emitter.send(IngestEvent::Batch(BatchEvent::Completed {
        batch: batch_index,
        processed: result.processed,
        skipped: result.skipped_local + result.skipped_db,
        errors: result.errors,
    }));
    debug!(
        processed = result.processed,
        skipped = result.skipped_local + result.skipped_db,
        errors = result.errors,
        ms = result.duration_ms,
        "batch finished"
    );
    result
}

/// A batch that was never started because the run was cancelled.
pub(super) fn cancelled_batch(
    batch_index: usize,
    uploads: &[UploadedImage],
    emitter: &Emitter,
) -> BatchResult {
    emitter.send(IngestEvent::Batch(BatchEvent::Failed {
        batch: batch_index,
        message: "cancelled".to_string(),
    }));
    BatchResult {
        batch_index,
        errors: uploads.len(),
        error_messages: uploads
            .iter()
            .map(|u| format!("{}: cancelled", u.file_name))
            .collect(),
        ..Default::default()
    }
}

/// Coarse stage-boundary update. The fraction tracks fingerprinting,
/// the only per-image count that is cheap to share across workers.
fn stage_progress(state: &RunState, stage: IngestStage, batch_index: usize, emitter: &Emitter) {
    let hashed = state.hashed.load(Ordering::Relaxed);
    emitter.send(IngestEvent::Progress(ProgressUpdate {
        stage,
        message: format!("{stage} batch {batch_index}"),
        current_file: None,
        fraction: hashed as f32 / state.total_images.max(1) as f32,
    }));
}

fn normalize_and_hash(
    state: &RunState,
    batch_index: usize,
    image: &mut ProcessedImage,
    emitter: &Emitter,
) -> OutputFormat {
    let canvas = match state
        .resolver
        .resolve(image.upload.template_id, None)
    {
        Ok(canvas) => canvas,
        Err(e) => {
            fail_image(batch_index, image, format!("canvas lookup failed: {e}"), emitter);
            return OutputFormat::Png;
        }
    };

    let normalized = match state.normalizer.normalize(
        &image.upload.content,
        &image.upload.file_name,
        &canvas,
    ) {
        Ok(normalized) => normalized,
        Err(e) => {
            fail_image(batch_index, image, e.to_string(), emitter);
            return canvas.format;
        }
    };
    image.normalized_bytes = Some(normalized.bytes);
    image.advance_to(Stage::Normalized);

    match state.engine.fingerprint(&normalized.image) {
        Ok(fingerprints) => {
            image.fingerprints = Some(fingerprints);
            image.advance_to(Stage::Hashed);
        }
        Err(e) => {
            fail_image(batch_index, image, e.to_string(), emitter);
            return canvas.format;
        }
    }

    let hashed = state.hashed.fetch_add(1, Ordering::Relaxed) + 1;
    emitter.send(IngestEvent::Batch(BatchEvent::ImageHashed {
        batch: batch_index,
        file_name: image.upload.file_name.clone(),
    }));
    emitter.send(IngestEvent::Progress(ProgressUpdate {
        stage: IngestStage::Hashing,
        message: format!("Fingerprinted {hashed} of {}", state.total_images),
        current_file: Some(image.upload.file_name.clone()),
        fraction: hashed as f32 / state.total_images.max(1) as f32,
    }));

    canvas.format
}

fn deduplicate(
    state: &RunState,
    batch_index: usize,
    images: &mut [ProcessedImage],
    emitter: &Emitter,
) {
    for image in images.iter_mut().filter(|i| !i.has_error()) {
        let Some(fingerprints) = image.fingerprints.clone() else {
            continue;
        };

        match state.detector.check(image.upload.user_id, &fingerprints) {
            Ok(verdict) => {
                image.advance_to(Stage::Deduplicated);
                let scope = match verdict {
                    DuplicateVerdict::Unique => continue,
                    DuplicateVerdict::DuplicateLocal => {
                        image.is_duplicate_local = true;
                        DuplicateScope::Local
                    }
                    DuplicateVerdict::DuplicateDb => {
                        image.is_duplicate_db = true;
                        DuplicateScope::Store
                    }
                };
                debug!(file = %image.upload.file_name, ?scope, "duplicate skipped");
                emitter.send(IngestEvent::Batch(BatchEvent::DuplicateSkipped {
                    batch: batch_index,
                    file_name: image.upload.file_name.clone(),
                    scope,
                }));
            }
            Err(e) => fail_image(batch_index, image, e.to_string(), emitter),
        }
    }
}

/// Assign sequential output names to unique images only, so duplicate
/// and errored uploads never consume a sequence number.
fn rename(state: &RunState, images: &mut [ProcessedImage], formats: &[OutputFormat]) {
    for (image, format) in images.iter_mut().zip(formats) {
        if !image.is_unique() {
            continue;
        }
        match state
            .caches
            .template_name(state.store.as_ref(), image.upload.template_id)
        {
            Ok(template_name) => {
                image.final_name =
                    Some(state.allocator.output_name(&template_name, format.extension()));
                image.advance_to(Stage::Renamed);
            }
            Err(e) => {
                warn!(file = %image.upload.file_name, error = %e, "rename failed");
                image.set_error(format!("template lookup failed: {e}"));
            }
        }
    }
}

fn fail_image(batch_index: usize, image: &mut ProcessedImage, message: String, emitter: &Emitter) {
    warn!(file = %image.upload.file_name, error = %message, "image failed");
    image.set_error(message.clone());
    emitter.send(IngestEvent::Batch(BatchEvent::ImageError {
        batch: batch_index,
        file_name: image.upload.file_name.clone(),
        message,
    }));
}

fn summarize(
    batch_index: usize,
    images: &[ProcessedImage],
    uploads: usize,
    db_updates: usize,
    started: Instant,
) -> BatchResult {
    let mut result = BatchResult {
        batch_index,
        uploads,
        db_updates,
        duration_ms: started.elapsed().as_millis() as u64,
        ..Default::default()
    };

    for image in images {
        if let Some(error) = &image.error {
            result.errors += 1;
            result
                .error_messages
                .push(format!("{}: {error}", image.upload.file_name));
        } else if image.is_duplicate_local {
            result.skipped_local += 1;
        } else if image.is_duplicate_db {
            result.skipped_db += 1;
        } else if image.persisted {
            result.processed += 1;
        } else {
            // Unique, error-free, but never persisted: accounting must
            // still see it. This only happens if a stage was skipped.
            result.errors += 1;
            result
                .error_messages
                .push(format!("{}: image was not persisted", image.upload.file_name));
        }
    }
    result
}

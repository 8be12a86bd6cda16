//! Batch-atomic catalog writer.

use super::{CatalogStore, DesignRow, FingerprintRecord, NameCaches};
use crate::core::model::{ProcessedImage, Stage};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Writes one bulk insert per batch, serialized across the whole run.
///
/// Batch workers run in parallel but the catalog store is not assumed
/// safe for concurrent bulk writes, so every `persist_batch` call takes
/// the run-wide write lock first.
pub struct PersistenceWriter {
    store: Arc<dyn CatalogStore>,
    write_lock: Mutex<()>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Persist every uploaded image of one batch in a single bulk
    /// insert. Returns the number of rows committed.
    ///
    /// On failure the whole batch rolls back: every candidate image
    /// gets the store's error recorded and none are marked persisted.
    pub fn persist_batch(&self, images: &mut [ProcessedImage], caches: &NameCaches) -> usize {
        let mut rows = Vec::new();
        let mut candidates = Vec::new();

        for (index, image) in images.iter_mut().enumerate() {
            if !image.is_unique() || !image.uploaded {
                continue;
            }
            match Self::build_row(self.store.as_ref(), caches, image) {
                Ok(row) => {
                    rows.push(row);
                    candidates.push(index);
                }
                Err(message) => image.set_error(message),
            }
        }

        if rows.is_empty() {
            return 0;
        }

        let written = {
            // The guard carries no data, so a poisoned lock is still usable
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            self.store.insert_designs(&rows)
        };

        match written {
            Ok(count) => {
                debug!(rows = count, "catalog batch committed");
                for index in candidates {
                    images[index].persisted = true;
                    images[index].advance_to(Stage::Persisted);
                }
                count
            }
            Err(e) => {
                warn!(error = %e, rows = rows.len(), "catalog batch rolled back");
                for index in candidates {
                    images[index].set_error(format!("catalog write failed: {e}"));
                }
                0
            }
        }
    }

    /// Assemble the catalog row for one uploaded image. Missing fields
    /// here mean an upstream stage was skipped.
    fn build_row(
        store: &dyn CatalogStore,
        caches: &NameCaches,
        image: &ProcessedImage,
    ) -> Result<DesignRow, String> {
        let fingerprints = image
            .fingerprints
            .as_ref()
            .ok_or_else(|| "image reached persistence without fingerprints".to_string())?;
        let file_name = image
            .final_name
            .clone()
            .ok_or_else(|| "image reached persistence without a final name".to_string())?;
        let storage_path = image
            .storage_path
            .clone()
            .ok_or_else(|| "image reached persistence without a storage path".to_string())?;

        let user_id = image.upload.user_id;
        let shop_name = caches
            .shop_name(store, user_id)
            .map_err(|e| format!("shop lookup failed: {e}"))?;
        let template_name = caches
            .template_name(store, image.upload.template_id)
            .map_err(|e| format!("template lookup failed: {e}"))?;

        Ok(DesignRow {
            user_id,
            template_id: image.upload.template_id,
            file_name,
            storage_path,
            shop_name,
            template_name,
            fingerprints: FingerprintRecord::from_set(fingerprints),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::FingerprintEngine;
    use crate::core::model::UploadedImage;
    use crate::core::persist::InMemoryCatalogStore;
    use image::DynamicImage;

    fn uploaded_image(file_name: &str, pixel_step: u8) -> ProcessedImage {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([
                (x as u8).wrapping_mul(pixel_step),
                (y as u8).wrapping_mul(pixel_step),
                128,
            ])
        }));
        let fingerprints = FingerprintEngine::default().fingerprint(&image).unwrap();

        let mut processed =
            ProcessedImage::new(UploadedImage::new(file_name, vec![0u8; 16], 7, Some(4)));
        processed.advance_to(Stage::Normalized);
        processed.advance_to(Stage::Hashed);
        processed.advance_to(Stage::Deduplicated);
        processed.advance_to(Stage::Renamed);
        processed.advance_to(Stage::Uploaded);
        processed.fingerprints = Some(fingerprints);
        processed.final_name = Some(format!("tee_{file_name}"));
        processed.storage_path = Some(format!("7/tees/tee_{file_name}"));
        processed.uploaded = true;
        processed
    }

    fn seeded_store() -> Arc<InMemoryCatalogStore> {
        Arc::new(
            InMemoryCatalogStore::new()
                .with_shop(7, "Print Palace")
                .with_template(4, "Classic Tee"),
        )
    }

    #[test]
    fn persists_uploaded_images_in_one_write() {
        let store = seeded_store();
        let writer = PersistenceWriter::new(store.clone());
        let caches = NameCaches::new();

        let mut images = vec![uploaded_image("a.png", 3), uploaded_image("b.png", 5)];
        let written = writer.persist_batch(&mut images, &caches);

        assert_eq!(written, 2);
        assert_eq!(store.design_count(), 2);
        assert!(images.iter().all(|i| i.persisted));
        assert!(images.iter().all(|i| i.stage() == Stage::Persisted));

        let rows = store.designs();
        assert_eq!(rows[0].shop_name, "Print Palace");
        assert_eq!(rows[0].template_name, "Classic Tee");
    }

    #[test]
    fn skips_duplicates_and_errored_images() {
        let store = seeded_store();
        let writer = PersistenceWriter::new(store.clone());
        let caches = NameCaches::new();

        let mut images = vec![
            uploaded_image("a.png", 3),
            uploaded_image("b.png", 5),
            uploaded_image("c.png", 7),
        ];
        images[1].is_duplicate_local = true;
        images[2].set_error("decode failed");

        let written = writer.persist_batch(&mut images, &caches);

        assert_eq!(written, 1);
        assert_eq!(store.design_count(), 1);
        assert!(images[0].persisted);
        assert!(!images[1].persisted);
        assert!(!images[2].persisted);
    }

    #[test]
    fn failed_write_rolls_back_the_whole_batch() {
        let store = seeded_store();
        store.set_fail_inserts(true);
        let writer = PersistenceWriter::new(store.clone());
        let caches = NameCaches::new();

        let mut images = vec![uploaded_image("a.png", 3), uploaded_image("b.png", 5)];
        let written = writer.persist_batch(&mut images, &caches);

        assert_eq!(written, 0);
        assert_eq!(store.design_count(), 0);
        assert!(images.iter().all(|i| !i.persisted));
        assert!(images.iter().all(|i| i.has_error()));
    }

    #[test]
    fn unknown_user_errors_only_that_image() {
        let store = Arc::new(InMemoryCatalogStore::new().with_template(4, "Classic Tee"));
        let writer = PersistenceWriter::new(store.clone());
        let caches = NameCaches::new();

        let mut images = vec![uploaded_image("a.png", 3)];
        let written = writer.persist_batch(&mut images, &caches);

        assert_eq!(written, 0);
        assert!(images[0].has_error());
        assert!(!images[0].persisted);
    }
}

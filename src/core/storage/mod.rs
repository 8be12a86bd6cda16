//! # Storage Module
//!
//! The object store seam and the bounded-parallel batch uploader.
//!
//! Upload failures are per-image: a failed put records an error on
//! that image and the rest of the batch continues.

use crate::core::model::{ProcessedImage, Stage};
use crate::error::StorageError;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default cap on concurrent puts per uploader
pub const DEFAULT_MAX_PARALLEL_UPLOADS: usize = 12;

/// Write-only seam to wherever the normalized bytes end up. The
/// surrounding product system decides the real backend.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, overwriting any previous object
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Object store backed by a directory tree
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.is_empty() || path.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(path))
    }
}

impl ObjectStore for LocalDirStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: path.to_string(),
                source,
            })?;
        }
        std::fs::write(&target, bytes).map_err(|source| StorageError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// In-memory object store for tests, with a per-path failure switch
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    fail_paths: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put whose path contains `fragment` fail
    pub fn fail_paths_containing(&self, fragment: &str) {
        self.fail_paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fragment.to_string());
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let failing = self
            .fail_paths
            .lock()
            .map_err(|_| StorageError::UploadFailed {
                path: path.to_string(),
                reason: "failure set lock poisoned".to_string(),
            })?
            .iter()
            .any(|fragment| path.contains(fragment));
        if failing {
            return Err(StorageError::UploadFailed {
                path: path.to_string(),
                reason: "injected upload failure".to_string(),
            });
        }
        self.objects
            .lock()
            .map_err(|_| StorageError::UploadFailed {
                path: path.to_string(),
                reason: "object map lock poisoned".to_string(),
            })?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Uploads the unique images of one batch on a dedicated bounded pool.
pub struct StorageUploader {
    store: Arc<dyn ObjectStore>,
    pool: ThreadPool,
}

impl StorageUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Result<Self, StorageError> {
        Self::with_parallelism(store, DEFAULT_MAX_PARALLEL_UPLOADS)
    }

    pub fn with_parallelism(
        store: Arc<dyn ObjectStore>,
        max_parallel: usize,
    ) -> Result<Self, StorageError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_parallel.max(1))
            .thread_name(|i| format!("upload-{i}"))
            .build()
            .map_err(|e| StorageError::UploadFailed {
                path: String::new(),
                reason: format!("upload pool: {e}"),
            })?;
        Ok(Self { store, pool })
    }

    /// Upload every renamed image of one batch. Returns how many puts
    /// succeeded.
    pub fn upload_batch(&self, images: &mut [ProcessedImage]) -> usize {
        self.pool.install(|| {
            images
                .par_iter_mut()
                .filter(|image| image.is_unique() && image.final_name.is_some())
                .map(|image| self.upload_one(image))
                .filter(|uploaded| *uploaded)
                .count()
        })
    }

    fn upload_one(&self, image: &mut ProcessedImage) -> bool {
        let Some(final_name) = image.final_name.clone() else {
            return false;
        };
        let Some(bytes) = image.normalized_bytes.as_deref() else {
            image.set_error("image reached upload without normalized bytes");
            return false;
        };

        let path = format!("{}/{final_name}", image.upload.user_id);
        match self.store.put(&path, bytes) {
            Ok(()) => {
                debug!(path = %path, bytes = bytes.len(), "object stored");
                image.storage_path = Some(path);
                image.uploaded = true;
                image.advance_to(Stage::Uploaded);
                true
            }
            Err(e) => {
                warn!(path = %path, error = %e, "upload failed");
                image.set_error(format!("upload failed: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::UploadedImage;
    use tempfile::TempDir;

    fn renamed_image(file_name: &str, final_name: &str) -> ProcessedImage {
        let mut processed =
            ProcessedImage::new(UploadedImage::new(file_name, vec![1, 2, 3], 7, None));
        processed.advance_to(Stage::Normalized);
        processed.advance_to(Stage::Hashed);
        processed.advance_to(Stage::Deduplicated);
        processed.advance_to(Stage::Renamed);
        processed.normalized_bytes = Some(vec![9, 9, 9]);
        processed.final_name = Some(final_name.to_string());
        processed
    }

    #[test]
    fn uploads_land_under_the_user_prefix() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = StorageUploader::with_parallelism(store.clone(), 4).unwrap();

        let mut images = vec![
            renamed_image("a.png", "tee_100.png"),
            renamed_image("b.png", "tee_101.png"),
        ];
        let uploaded = uploader.upload_batch(&mut images);

        assert_eq!(uploaded, 2);
        assert_eq!(store.paths(), vec!["7/tee_100.png", "7/tee_101.png"]);
        assert!(images.iter().all(|i| i.uploaded));
        assert_eq!(images[0].storage_path.as_deref(), Some("7/tee_100.png"));
    }

    #[test]
    fn one_failed_put_does_not_stop_the_batch() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.fail_paths_containing("tee_101");
        let uploader = StorageUploader::with_parallelism(store.clone(), 4).unwrap();

        let mut images = vec![
            renamed_image("a.png", "tee_100.png"),
            renamed_image("b.png", "tee_101.png"),
            renamed_image("c.png", "tee_102.png"),
        ];
        let uploaded = uploader.upload_batch(&mut images);

        assert_eq!(uploaded, 2);
        assert_eq!(store.object_count(), 2);
        assert!(images[1].has_error());
        assert!(!images[1].uploaded);
        assert!(images[0].uploaded && images[2].uploaded);
    }

    #[test]
    fn duplicates_and_errored_images_are_not_uploaded() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = StorageUploader::with_parallelism(store.clone(), 2).unwrap();

        let mut images = vec![
            renamed_image("a.png", "tee_100.png"),
            renamed_image("b.png", "tee_101.png"),
        ];
        images[0].is_duplicate_db = true;
        images[1].set_error("decode failed");

        assert_eq!(uploader.upload_batch(&mut images), 0);
        assert_eq!(store.object_count(), 0);
    }

    #[test]
    fn local_dir_store_writes_nested_paths() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(dir.path());

        store.put("7/tees/tee_100.png", b"bytes").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("7/tees/tee_100.png")).unwrap(),
            b"bytes"
        );

        assert!(matches!(
            store.put("../escape.png", b"bytes"),
            Err(StorageError::InvalidPath { .. })
        ));
    }
}

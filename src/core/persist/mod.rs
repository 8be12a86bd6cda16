//! # Persist Module
//!
//! The relational catalog store interface and the batch-atomic bulk
//! writer sitting in front of it.
//!
//! ## Guarantees
//! - Exactly one bulk insert per batch (bounds round trips under
//!   high-volume runs)
//! - All bulk writes across batches go through one shared lock; the
//!   downstream store is not assumed safe for concurrent bulk writes
//! - A failed bulk write rolls the whole batch back: zero images from
//!   that batch are marked persisted, even if some rows "should" have
//!   succeeded

mod memory;
mod sqlite;
mod writer;

pub use memory::InMemoryCatalogStore;
pub use sqlite::SqliteCatalogStore;
pub use writer::PersistenceWriter;

use crate::core::hasher::{FingerprintSet, HashAlgorithmKind, PerceptualHash};
use crate::error::PersistError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// The four stored hash strings of one catalog design
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub average: String,
    pub difference: String,
    pub wavelet: String,
    pub frequency: String,
}

impl FingerprintRecord {
    pub fn from_set(set: &FingerprintSet) -> Self {
        Self {
            average: set.average.to_hex(),
            difference: set.difference.to_hex(),
            wavelet: set.wavelet.to_hex(),
            frequency: set.frequency.to_hex(),
        }
    }

    /// The stored hash for one algorithm
    pub fn get(&self, kind: HashAlgorithmKind) -> &str {
        match kind {
            HashAlgorithmKind::Average => &self.average,
            HashAlgorithmKind::Difference => &self.difference,
            HashAlgorithmKind::Wavelet => &self.wavelet,
            HashAlgorithmKind::Frequency => &self.frequency,
        }
    }
}

/// One catalog row recorded per accepted image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRow {
    pub user_id: i64,
    pub template_id: Option<i64>,
    /// Assigned sequential output name
    pub file_name: String,
    /// Object-store path the bytes live at
    pub storage_path: String,
    /// Display name of the owning shop
    pub shop_name: String,
    /// Display name of the target template
    pub template_name: String,
    pub fingerprints: FingerprintRecord,
    pub created_at: DateTime<Utc>,
}

/// The relational store the pipeline consumes. The surrounding product
/// system owns the real database; the pipeline only needs these five
/// operations.
pub trait CatalogStore: Send + Sync {
    /// All fingerprints already recorded for this user
    fn existing_fingerprints(&self, user_id: i64) -> Result<Vec<FingerprintRecord>, PersistError>;

    /// Indexed exact-match lookup: is this hash recorded for this user?
    fn hash_exists(&self, user_id: i64, hash: &str) -> Result<bool, PersistError>;

    /// Insert all rows atomically; returns the number inserted.
    /// Implementations must roll back every row on any failure.
    fn insert_designs(&self, rows: &[DesignRow]) -> Result<usize, PersistError>;

    /// Resolve a user to their shop display name
    fn shop_name(&self, user_id: i64) -> Result<String, PersistError>;

    /// Resolve a template to its display name
    fn template_name(&self, template_id: i64) -> Result<String, PersistError>;
}

/// Run-scoped lookup caches for shop and template display names.
///
/// Both maps are shared across all batch workers and mutated only under
/// their locks; they live for one pipeline run.
#[derive(Default)]
pub struct NameCaches {
    shop_names: Mutex<HashMap<i64, String>>,
    template_names: Mutex<HashMap<i64, String>>,
}

impl NameCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shop name for a user, fetching through the store at most once per run
    pub fn shop_name(
        &self,
        store: &dyn CatalogStore,
        user_id: i64,
    ) -> Result<String, PersistError> {
        if let Some(name) = self
            .shop_names
            .lock()
            .map_err(|_| PersistError::QueryFailed("shop name cache lock poisoned".into()))?
            .get(&user_id)
        {
            return Ok(name.clone());
        }

        let name = store.shop_name(user_id)?;
        self.shop_names
            .lock()
            .map_err(|_| PersistError::QueryFailed("shop name cache lock poisoned".into()))?
            .insert(user_id, name.clone());
        Ok(name)
    }

    /// Template name, fetching through the store at most once per run.
    /// Uploads without a template get the generic segment.
    pub fn template_name(
        &self,
        store: &dyn CatalogStore,
        template_id: Option<i64>,
    ) -> Result<String, PersistError> {
        let Some(template_id) = template_id else {
            return Ok("design".to_string());
        };

        if let Some(name) = self
            .template_names
            .lock()
            .map_err(|_| PersistError::QueryFailed("template name cache lock poisoned".into()))?
            .get(&template_id)
        {
            return Ok(name.clone());
        }

        let name = store.template_name(template_id)?;
        self.template_names
            .lock()
            .map_err(|_| PersistError::QueryFailed("template name cache lock poisoned".into()))?
            .insert(template_id, name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        lookups: AtomicUsize,
    }

    impl CatalogStore for CountingStore {
        fn existing_fingerprints(&self, _: i64) -> Result<Vec<FingerprintRecord>, PersistError> {
            Ok(Vec::new())
        }
        fn hash_exists(&self, _: i64, _: &str) -> Result<bool, PersistError> {
            Ok(false)
        }
        fn insert_designs(&self, rows: &[DesignRow]) -> Result<usize, PersistError> {
            Ok(rows.len())
        }
        fn shop_name(&self, user_id: i64) -> Result<String, PersistError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(format!("shop-{user_id}"))
        }
        fn template_name(&self, template_id: i64) -> Result<String, PersistError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(format!("template-{template_id}"))
        }
    }

    #[test]
    fn name_caches_fetch_at_most_once() {
        let store = CountingStore {
            lookups: AtomicUsize::new(0),
        };
        let caches = NameCaches::new();

        assert_eq!(caches.shop_name(&store, 7).unwrap(), "shop-7");
        assert_eq!(caches.shop_name(&store, 7).unwrap(), "shop-7");
        assert_eq!(caches.template_name(&store, Some(3)).unwrap(), "template-3");
        assert_eq!(caches.template_name(&store, Some(3)).unwrap(), "template-3");

        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_template_gets_generic_name() {
        let store = CountingStore {
            lookups: AtomicUsize::new(0),
        };
        let caches = NameCaches::new();

        assert_eq!(caches.template_name(&store, None).unwrap(), "design");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }
}

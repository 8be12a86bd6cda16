//! In-memory catalog store for tests and dry runs.

use super::{CatalogStore, DesignRow, FingerprintRecord};
use crate::error::PersistError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Keeps the whole catalog in maps and vectors. Carries a failure
/// switch so callers can exercise rollback paths without a database.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    designs: Mutex<Vec<DesignRow>>,
    shops: Mutex<HashMap<i64, String>>,
    templates: Mutex<HashMap<i64, String>>,
    fail_inserts: AtomicBool,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shop(self, user_id: i64, shop_name: &str) -> Self {
        self.shops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, shop_name.to_string());
        self
    }

    pub fn with_template(self, template_id: i64, name: &str) -> Self {
        self.templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(template_id, name.to_string());
        self
    }

    /// When set, every bulk insert fails without writing a row
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every recorded design row
    pub fn designs(&self) -> Vec<DesignRow> {
        self.designs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn design_count(&self) -> usize {
        self.designs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn poisoned(what: &str) -> PersistError {
    PersistError::QueryFailed(format!("{what} lock poisoned"))
}

impl CatalogStore for InMemoryCatalogStore {
    fn existing_fingerprints(&self, user_id: i64) -> Result<Vec<FingerprintRecord>, PersistError> {
        let designs = self.designs.lock().map_err(|_| poisoned("design list"))?;
        Ok(designs
            .iter()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.fingerprints.clone())
            .collect())
    }

    fn hash_exists(&self, user_id: i64, hash: &str) -> Result<bool, PersistError> {
        let designs = self.designs.lock().map_err(|_| poisoned("design list"))?;
        Ok(designs.iter().any(|row| {
            row.user_id == user_id
                && (row.fingerprints.average == hash
                    || row.fingerprints.difference == hash
                    || row.fingerprints.wavelet == hash
                    || row.fingerprints.frequency == hash)
        }))
    }

    fn insert_designs(&self, rows: &[DesignRow]) -> Result<usize, PersistError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(PersistError::BulkInsertFailed(
                "injected insert failure".to_string(),
            ));
        }
        let mut designs = self.designs.lock().map_err(|_| poisoned("design list"))?;
        designs.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn shop_name(&self, user_id: i64) -> Result<String, PersistError> {
        self.shops
            .lock()
            .map_err(|_| poisoned("shop map"))?
            .get(&user_id)
            .cloned()
            .ok_or(PersistError::UnknownUser { user_id })
    }

    fn template_name(&self, template_id: i64) -> Result<String, PersistError> {
        self.templates
            .lock()
            .map_err(|_| poisoned("template map"))?
            .get(&template_id)
            .cloned()
            .ok_or(PersistError::UnknownTemplate { template_id })
    }
}

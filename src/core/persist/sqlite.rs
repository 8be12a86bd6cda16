//! SQLite catalog store backend.
//!
//! Uses WAL (Write-Ahead Logging) mode so duplicate-detection reads can
//! proceed while another batch's bulk write is in flight.

use super::{CatalogStore, DesignRow, FingerprintRecord};
use crate::error::PersistError;
#[cfg(test)]
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite-backed catalog store
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteCatalogStore {
    /// Open or create a catalog database at the given path
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| PersistError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS shops (
                user_id INTEGER PRIMARY KEY,
                shop_name TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS designs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                template_id INTEGER,
                file_name TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                shop_name TEXT NOT NULL,
                template_name TEXT NOT NULL,
                average_hash TEXT NOT NULL,
                difference_hash TEXT NOT NULL,
                wavelet_hash TEXT NOT NULL,
                frequency_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        // Exact-match duplicate lookups hit these
        for column in [
            "average_hash",
            "difference_hash",
            "wavelet_hash",
            "frequency_hash",
        ] {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_designs_{column}
                     ON designs(user_id, {column})"
                ),
                [],
            )
            .map_err(|e| PersistError::QueryFailed(e.to_string()))?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistError> {
        self.conn.lock().map_err(|_| PersistError::OpenFailed {
            path: self.db_path.display().to_string(),
            reason: "connection lock poisoned".to_string(),
        })
    }

    /// Register or update a shop display name
    pub fn upsert_shop(&self, user_id: i64, shop_name: &str) -> Result<(), PersistError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO shops (user_id, shop_name) VALUES (?, ?)",
            params![user_id, shop_name],
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Register or update a template display name
    pub fn upsert_template(&self, template_id: i64, name: &str) -> Result<(), PersistError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO templates (id, name) VALUES (?, ?)",
            params![template_id, name],
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Number of design rows for one user
    pub fn design_count(&self, user_id: i64) -> Result<usize, PersistError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM designs WHERE user_id = ?",
            [user_id],
            |row| row.get::<_, i64>(0).map(|v| v as usize),
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn existing_fingerprints(&self, user_id: i64) -> Result<Vec<FingerprintRecord>, PersistError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT average_hash, difference_hash, wavelet_hash, frequency_hash
                 FROM designs WHERE user_id = ?",
            )
            .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        let records = stmt
            .query_map([user_id], |row| {
                Ok(FingerprintRecord {
                    average: row.get(0)?,
                    difference: row.get(1)?,
                    wavelet: row.get(2)?,
                    frequency: row.get(3)?,
                })
            })
            .map_err(|e| PersistError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PersistError::QueryFailed(e.to_string()))?;

        Ok(records)
    }

    fn hash_exists(&self, user_id: i64, hash: &str) -> Result<bool, PersistError> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM designs
                WHERE user_id = ?1
                  AND (average_hash = ?2 OR difference_hash = ?2
                       OR wavelet_hash = ?2 OR frequency_hash = ?2)
             )",
            params![user_id, hash],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| PersistError::QueryFailed(e.to_string()))
    }

    fn insert_designs(&self, rows: &[DesignRow]) -> Result<usize, PersistError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;

        let tx = conn
            .transaction()
            .map_err(|e| PersistError::BulkInsertFailed(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO designs
                     (user_id, template_id, file_name, storage_path, shop_name,
                      template_name, average_hash, difference_hash, wavelet_hash,
                      frequency_hash, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| PersistError::BulkInsertFailed(e.to_string()))?;

            for row in rows {
                stmt.execute(params![
                    row.user_id,
                    row.template_id,
                    row.file_name,
                    row.storage_path,
                    row.shop_name,
                    row.template_name,
                    row.fingerprints.average,
                    row.fingerprints.difference,
                    row.fingerprints.wavelet,
                    row.fingerprints.frequency,
                    row.created_at.timestamp(),
                ])
                .map_err(|e| PersistError::BulkInsertFailed(e.to_string()))?;
                // A failed execute drops the transaction: automatic rollback
            }
        }

        tx.commit()
            .map_err(|e| PersistError::BulkInsertFailed(e.to_string()))?;

        Ok(rows.len())
    }

    fn shop_name(&self, user_id: i64) -> Result<String, PersistError> {
        let conn = self.lock()?;

        match conn.query_row(
            "SELECT shop_name FROM shops WHERE user_id = ?",
            [user_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(name) => Ok(name),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(PersistError::UnknownUser { user_id })
            }
            Err(e) => Err(PersistError::QueryFailed(e.to_string())),
        }
    }

    fn template_name(&self, template_id: i64) -> Result<String, PersistError> {
        let conn = self.lock()?;

        match conn.query_row(
            "SELECT name FROM templates WHERE id = ?",
            [template_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(name) => Ok(name),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(PersistError::UnknownTemplate { template_id })
            }
            Err(e) => Err(PersistError::QueryFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(user_id: i64, file_name: &str, hash_seed: &str) -> DesignRow {
        DesignRow {
            user_id,
            template_id: Some(4),
            file_name: file_name.to_string(),
            storage_path: format!("{user_id}/tees/{file_name}"),
            shop_name: "Print Palace".to_string(),
            template_name: "Classic Tee".to_string(),
            fingerprints: FingerprintRecord {
                average: format!("{hash_seed}aa"),
                difference: format!("{hash_seed}bb"),
                wavelet: format!("{hash_seed}cc"),
                frequency: format!("{hash_seed}dd"),
            },
            created_at: Utc::now(),
        }
    }

    fn open_store(dir: &TempDir) -> SqliteCatalogStore {
        SqliteCatalogStore::open(&dir.path().join("catalog.db")).unwrap()
    }

    #[test]
    fn store_creates_database() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(dir.path().join("catalog.db").exists());
        assert_eq!(store.design_count(1).unwrap(), 0);
    }

    #[test]
    fn bulk_insert_and_fetch_fingerprints() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let rows = vec![row(7, "tee_100.png", "01"), row(7, "tee_101.png", "02")];
        assert_eq!(store.insert_designs(&rows).unwrap(), 2);

        let fingerprints = store.existing_fingerprints(7).unwrap();
        assert_eq!(fingerprints.len(), 2);
        assert_eq!(fingerprints[0].average, "01aa");

        // Another user's catalog is untouched
        assert!(store.existing_fingerprints(8).unwrap().is_empty());
    }

    #[test]
    fn hash_exists_matches_any_column() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.insert_designs(&[row(7, "tee_100.png", "01")]).unwrap();

        assert!(store.hash_exists(7, "01aa").unwrap());
        assert!(store.hash_exists(7, "01cc").unwrap());
        assert!(!store.hash_exists(7, "ffff").unwrap());
        assert!(!store.hash_exists(8, "01aa").unwrap());
    }

    #[test]
    fn empty_bulk_insert_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.insert_designs(&[]).unwrap(), 0);
    }

    #[test]
    fn shop_and_template_lookups() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.upsert_shop(7, "Print Palace").unwrap();
        store.upsert_template(4, "Classic Tee").unwrap();

        assert_eq!(store.shop_name(7).unwrap(), "Print Palace");
        assert_eq!(store.template_name(4).unwrap(), "Classic Tee");

        assert!(matches!(
            store.shop_name(99),
            Err(PersistError::UnknownUser { user_id: 99 })
        ));
        assert!(matches!(
            store.template_name(99),
            Err(PersistError::UnknownTemplate { template_id: 99 })
        ));
    }
}

//! # Error Module
//!
//! Error types for the ingestion pipeline.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - file names, user ids, what went wrong
//! - **Per-image errors stay per-image** - a bad upload never aborts
//!   the batch, a bad batch never aborts the run

use thiserror::Error;

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Duplicate detection error: {0}")]
    Dedup(#[from] DedupError),

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Catalog store error: {0}")]
    Persist(#[from] PersistError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run was cancelled")]
    Cancelled,
}

/// Errors that occur while normalizing an uploaded image
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Failed to decode image {file_name}: {reason}")]
    DecodeError { file_name: String, reason: String },

    #[error("Image is empty or corrupted: {file_name}")]
    EmptyImage { file_name: String },

    #[error("Failed to encode image {file_name}: {reason}")]
    EncodeError { file_name: String, reason: String },

    #[error("No canvas configuration for template {template_id}")]
    UnknownCanvas { template_id: i64 },
}

/// Errors that occur during fingerprint computation
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Invalid image dimensions ({width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Hash computation failed: {0}")]
    ComputationFailed(String),

    #[error("Malformed hash string: {0}")]
    MalformedHash(String),
}

/// Errors that occur during duplicate detection
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Image has no fingerprints to compare")]
    MissingFingerprints,

    #[error("Failed to load reference hashes for user {user_id}: {reason}")]
    ReferenceLoadFailed { user_id: i64, reason: String },
}

/// Errors from the object store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Upload failed for {path}: {reason}")]
    UploadFailed { path: String, reason: String },

    #[error("Invalid storage path: {path}")]
    InvalidPath { path: String },

    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the relational catalog store
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to open catalog store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Bulk insert failed, batch rolled back: {0}")]
    BulkInsertFailed(String),

    #[error("Unknown user: {user_id}")]
    UnknownUser { user_id: i64 },

    #[error("Unknown template: {template_id}")]
    UnknownTemplate { template_id: i64 },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_error_includes_file_name() {
        let error = NormalizeError::DecodeError {
            file_name: "design-final.png".to_string(),
            reason: "invalid PNG signature".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("design-final.png"));
        assert!(message.contains("invalid PNG signature"));
    }

    #[test]
    fn storage_error_includes_path() {
        let error = StorageError::UploadFailed {
            path: "42/summer/shirt_101.png".to_string(),
            reason: "connection reset".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("42/summer/shirt_101.png"));
    }

    #[test]
    fn persist_error_mentions_rollback() {
        let error = PersistError::BulkInsertFailed("disk full".to_string());
        let message = error.to_string();
        assert!(message.contains("rolled back"));
    }

    #[test]
    fn errors_convert_to_top_level() {
        let error: IngestError = HashError::MalformedHash("xyz".to_string()).into();
        assert!(matches!(error, IngestError::Hash(_)));
    }
}

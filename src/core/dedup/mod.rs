//! # Dedup Module
//!
//! Duplicate detection against two reference collections: images
//! accepted earlier in the same run, and designs already recorded in
//! the user's catalog.
//!
//! An image is a duplicate when at least `min_matches` of its four
//! hashes land within the Hamming threshold of some reference hash of
//! the same algorithm. The hits need not come from the same reference
//! image: each algorithm votes against its own pool. One agreeing
//! algorithm alone never disqualifies an image; agreement across
//! algorithms does.

use crate::core::hasher::{FingerprintSet, HashAlgorithmKind, ImageHashValue, PerceptualHash};
use crate::core::persist::CatalogStore;
use crate::error::DedupError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Thresholds for the quorum rule.
///
/// The run-local threshold is tighter than the store threshold: images
/// in one upload set are expected to be near-identical variants when
/// they collide, while catalog comparisons tolerate re-exports and
/// recompression drift.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Max Hamming distance against images accepted this run
    pub local_threshold: u32,
    /// Max Hamming distance against stored catalog designs
    pub store_threshold: u32,
    /// Per-algorithm matches required for a duplicate verdict
    pub min_matches: u8,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            local_threshold: 2,
            store_threshold: 5,
            min_matches: 2,
        }
    }
}

/// Outcome of checking one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateVerdict {
    Unique,
    /// Matched an image accepted earlier in this run
    DuplicateLocal,
    /// Matched a design already in the catalog store
    DuplicateDb,
}

/// In-run reference state. One mutex so the check-then-accept sequence
/// is atomic across parallel batch workers.
#[derive(Default)]
struct LocalRefs {
    /// Every hex hash of every accepted image, for O(1) exact matches
    exact: HashSet<String>,
    /// Full fingerprint sets of accepted images, for fuzzy matches
    accepted: Vec<FingerprintSet>,
}

/// Duplicate detector shared by all batch workers of one run.
pub struct DuplicateDetector {
    config: DedupConfig,
    store: Arc<dyn CatalogStore>,
    local: Mutex<LocalRefs>,
    /// Catalog fingerprints fetched at most once per user per run
    references: Mutex<HashMap<i64, Arc<Vec<FingerprintSet>>>>,
    /// Store verdicts keyed by fingerprint, so a re-upload of the same
    /// bytes in a later batch skips the store entirely
    verdicts: Mutex<HashMap<String, bool>>,
}

impl DuplicateDetector {
    pub fn new(config: DedupConfig, store: Arc<dyn CatalogStore>) -> Self {
        Self {
            config,
            store,
            local: Mutex::new(LocalRefs::default()),
            references: Mutex::new(HashMap::new()),
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Classify one image and, when it is not a run-local duplicate,
    /// accept it as a reference for the rest of the run.
    ///
    /// Acceptance happens before the store check so that two copies of
    /// one image in different batches cannot both pass.
    pub fn check(
        &self,
        user_id: i64,
        fingerprints: &FingerprintSet,
    ) -> Result<DuplicateVerdict, DedupError> {
        let hexes = fingerprints.hex_strings();

        {
            let mut local = self
                .local
                .lock()
                .map_err(|_| lock_poisoned(user_id, "local reference set"))?;

            if hexes.iter().any(|(_, hex)| local.exact.contains(hex)) {
                return Ok(DuplicateVerdict::DuplicateLocal);
            }

            if quorum_hit(
                fingerprints,
                &local.accepted,
                self.config.local_threshold,
                self.config.min_matches,
            ) {
                return Ok(DuplicateVerdict::DuplicateLocal);
            }

            for (_, hex) in &hexes {
                local.exact.insert(hex.clone());
            }
            local.accepted.push(fingerprints.clone());
        }

        if self.is_store_duplicate(user_id, fingerprints, &hexes)? {
            Ok(DuplicateVerdict::DuplicateDb)
        } else {
            Ok(DuplicateVerdict::Unique)
        }
    }

    fn is_store_duplicate(
        &self,
        user_id: i64,
        fingerprints: &FingerprintSet,
        hexes: &[(HashAlgorithmKind, String); 4],
    ) -> Result<bool, DedupError> {
        let key = format!(
            "{user_id}:{}",
            hexes
                .iter()
                .map(|(_, hex)| hex.as_str())
                .collect::<Vec<_>>()
                .join("")
        );

        if let Some(&verdict) = self
            .verdicts
            .lock()
            .map_err(|_| lock_poisoned(user_id, "verdict cache"))?
            .get(&key)
        {
            return Ok(verdict);
        }

        let mut duplicate = false;
        for (_, hex) in hexes {
            if self
                .store
                .hash_exists(user_id, hex)
                .map_err(|e| DedupError::ReferenceLoadFailed {
                    user_id,
                    reason: e.to_string(),
                })?
            {
                duplicate = true;
                break;
            }
        }

        if !duplicate {
            let references = self.references_for(user_id)?;
            duplicate = quorum_hit(
                fingerprints,
                &references,
                self.config.store_threshold,
                self.config.min_matches,
            );
        }

        self.verdicts
            .lock()
            .map_err(|_| lock_poisoned(user_id, "verdict cache"))?
            .insert(key, duplicate);
        Ok(duplicate)
    }

    /// Catalog fingerprints for a user, fetched and parsed once per run
    fn references_for(&self, user_id: i64) -> Result<Arc<Vec<FingerprintSet>>, DedupError> {
        if let Some(references) = self
            .references
            .lock()
            .map_err(|_| lock_poisoned(user_id, "reference cache"))?
            .get(&user_id)
        {
            return Ok(references.clone());
        }

        let records = self.store.existing_fingerprints(user_id).map_err(|e| {
            DedupError::ReferenceLoadFailed {
                user_id,
                reason: e.to_string(),
            }
        })?;

        let mut sets = Vec::with_capacity(records.len());
        for record in &records {
            match parse_record(record) {
                Ok(set) => sets.push(set),
                // A malformed stored hash cannot block the upload run
                Err(hex) => warn!(user_id, hash = %hex, "skipping malformed stored hash"),
            }
        }
        debug!(user_id, count = sets.len(), "loaded catalog references");

        let sets = Arc::new(sets);
        self.references
            .lock()
            .map_err(|_| lock_poisoned(user_id, "reference cache"))?
            .insert(user_id, sets.clone());
        Ok(sets)
    }
}

/// Per-algorithm pool vote: each of the candidate's four hashes counts
/// one hit if any reference hash of the same algorithm is within
/// `threshold`. Duplicate iff `min_matches` algorithms hit.
fn quorum_hit(
    candidate: &FingerprintSet,
    references: &[FingerprintSet],
    threshold: u32,
    min_matches: u8,
) -> bool {
    if references.is_empty() {
        return false;
    }

    let mut votes = 0u8;
    for kind in HashAlgorithmKind::ALL {
        let hash = candidate.get(kind);
        if references
            .iter()
            .any(|reference| hash.distance(reference.get(kind)) <= threshold)
        {
            votes += 1;
            if votes >= min_matches {
                return true;
            }
        }
    }
    false
}

fn lock_poisoned(user_id: i64, what: &str) -> DedupError {
    DedupError::ReferenceLoadFailed {
        user_id,
        reason: format!("{what} lock poisoned"),
    }
}

fn parse_record(record: &crate::core::persist::FingerprintRecord) -> Result<FingerprintSet, String> {
    let parse = |hex: &str, kind| {
        ImageHashValue::from_hex(hex, kind).map_err(|_| hex.to_string())
    };
    Ok(FingerprintSet::new(
        parse(&record.average, HashAlgorithmKind::Average)?,
        parse(&record.difference, HashAlgorithmKind::Difference)?,
        parse(&record.wavelet, HashAlgorithmKind::Wavelet)?,
        parse(&record.frequency, HashAlgorithmKind::Frequency)?,
    ))
}

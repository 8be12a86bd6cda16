//! Sequential output-name allocation shared by all batch workers.

use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Default starting sequence number for output names
pub const DEFAULT_SEQUENCE_START: u64 = 100;

/// A single shared counter producing gap-free sequential indices for
/// surviving (non-duplicate) images, regardless of which parallel batch
/// requests them. Batches never know their global offset in advance;
/// they take indices lazily, one atomic increment per unique image.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl SequenceAllocator {
    /// Start the run's counter from a caller-supplied value
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Take the next index: returns the pre-increment value
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Peek at the next value without taking it (reporting only)
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Build the final output name for one unique image
    pub fn output_name(&self, template_name: &str, extension: &str) -> String {
        let index = self.next();
        format!(
            "{}_{}.{}",
            sanitize_name_segment(template_name),
            index,
            extension
        )
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_START)
    }
}

/// Collapse anything outside `[A-Za-z0-9._-]` to underscores so template
/// display names are safe in filenames and storage paths.
pub fn sanitize_name_segment(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    let sanitized = pattern.replace_all(name.trim(), "_");
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "design".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn next_returns_pre_increment_value() {
        let allocator = SequenceAllocator::new(100);
        assert_eq!(allocator.next(), 100);
        assert_eq!(allocator.next(), 101);
        assert_eq!(allocator.peek(), 102);
    }

    #[test]
    fn concurrent_allocation_is_gap_free() {
        let allocator = Arc::new(SequenceAllocator::new(500));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || (0..100).map(|_| allocator.next()).collect::<Vec<u64>>())
            })
            .collect();

        let mut taken = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                // Every index handed out exactly once
                assert!(taken.insert(value));
            }
        }

        assert_eq!(taken.len(), 800);
        assert_eq!(*taken.iter().min().unwrap(), 500);
        assert_eq!(*taken.iter().max().unwrap(), 1299);
    }

    #[test]
    fn output_name_embeds_template_and_index() {
        let allocator = SequenceAllocator::new(100);
        assert_eq!(allocator.output_name("Summer Tee", "png"), "Summer_Tee_100.png");
        assert_eq!(allocator.output_name("Summer Tee", "png"), "Summer_Tee_101.png");
    }

    #[test]
    fn sanitize_collapses_unsafe_runs() {
        assert_eq!(sanitize_name_segment("Fall / Winter '24"), "Fall_Winter_24");
        assert_eq!(sanitize_name_segment("plain-name_1.2"), "plain-name_1.2");
    }

    #[test]
    fn sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_name_segment("   "), "design");
        assert_eq!(sanitize_name_segment("!!!"), "design");
    }
}

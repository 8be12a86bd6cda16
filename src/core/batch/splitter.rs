//! Splits the full upload list into bounded sub-batches.

use crate::core::model::UploadedImage;

/// Default cumulative byte size per batch: 100 MB
pub const DEFAULT_MAX_BATCH_BYTES: usize = 100 * 1024 * 1024;

/// Default item count per batch
pub const DEFAULT_MAX_BATCH_COUNT: usize = 50;

/// Partitions uploads into sub-batches bounded by both cumulative byte
/// size and item count. Whichever bound triggers first ends the batch;
/// the triggering image starts the next one. An image larger than the
/// byte bound still forms a batch of one - oversized uploads are never
/// split.
#[derive(Debug, Clone)]
pub struct BatchSplitter {
    max_bytes: usize,
    max_count: usize,
}

impl BatchSplitter {
    pub fn new(max_bytes: usize, max_count: usize) -> Self {
        Self {
            max_bytes,
            max_count: max_count.max(1),
        }
    }

    /// Split uploads in order. Empty input yields zero batches.
    pub fn split(&self, uploads: Vec<UploadedImage>) -> Vec<Vec<UploadedImage>> {
        let mut batches = Vec::new();
        let mut current: Vec<UploadedImage> = Vec::new();
        let mut current_bytes = 0usize;

        for upload in uploads {
            let would_exceed_bytes =
                !current.is_empty() && current_bytes + upload.byte_len > self.max_bytes;
            let at_count_limit = current.len() >= self.max_count;

            if would_exceed_bytes || at_count_limit {
                batches.push(std::mem::take(&mut current));
                current_bytes = 0;
            }

            current_bytes += upload.byte_len;
            current.push(upload);
        }

        if !current.is_empty() {
            batches.push(current);
        }

        batches
    }
}

impl Default for BatchSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(len: usize) -> UploadedImage {
        UploadedImage::new("img.png", vec![0u8; len], 1, None)
    }

    #[test]
    fn empty_input_yields_zero_batches() {
        let splitter = BatchSplitter::default();
        assert!(splitter.split(Vec::new()).is_empty());
    }

    #[test]
    fn count_limit_ends_the_batch() {
        let splitter = BatchSplitter::new(usize::MAX, 50);
        let uploads: Vec<_> = (0..60).map(|_| upload(10)).collect();

        let batches = splitter.split(uploads);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[1].len(), 10);
    }

    #[test]
    fn byte_limit_ends_the_batch() {
        let splitter = BatchSplitter::new(100, 1000);
        let uploads: Vec<_> = (0..5).map(|_| upload(40)).collect();

        let batches = splitter.split(uploads);

        // 40+40 fits, the third 40 would exceed 100
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn triggering_image_starts_the_next_batch() {
        let splitter = BatchSplitter::new(100, 1000);
        let uploads = vec![upload(90), upload(20), upload(20)];

        let batches = splitter.split(uploads);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn oversized_single_image_is_never_split() {
        let splitter = BatchSplitter::new(100, 50);
        let uploads = vec![upload(500), upload(10)];

        let batches = splitter.split(uploads);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].byte_len, 500);
    }

    #[test]
    fn every_batch_respects_both_bounds() {
        let splitter = BatchSplitter::new(1000, 7);
        let uploads: Vec<_> = (0..100)
            .map(|i| upload(if i % 13 == 0 { 900 } else { 120 }))
            .collect();

        let batches = splitter.split(uploads);
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 100);

        for batch in &batches {
            let bytes: usize = batch.iter().map(|u| u.byte_len).sum();
            assert!(bytes <= 1000 || batch.len() == 1);
            assert!(batch.len() <= 7);
        }
    }

    #[test]
    fn input_order_is_preserved() {
        let splitter = BatchSplitter::new(usize::MAX, 3);
        let uploads: Vec<_> = (0..7)
            .map(|i| UploadedImage::new(format!("{i}.png"), vec![0u8; 4], 1, None))
            .collect();

        let batches = splitter.split(uploads);
        let flattened: Vec<_> = batches
            .iter()
            .flatten()
            .map(|u| u.file_name.clone())
            .collect();

        assert_eq!(
            flattened,
            vec!["0.png", "1.png", "2.png", "3.png", "4.png", "5.png", "6.png"]
        );
    }
}

//! # Batch Module
//!
//! Splits the upload list into bounded sub-batches and allocates the
//! gap-free sequential output names unique images receive.

mod sequence;
mod splitter;

pub use sequence::{sanitize_name_segment, SequenceAllocator, DEFAULT_SEQUENCE_START};
pub use splitter::{BatchSplitter, DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_COUNT};

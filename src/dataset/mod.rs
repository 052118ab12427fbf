//! Labeled source datasets.
//!
//! A source dataset is an ordered collection of (image, label index) pairs.
//! Download and caching of the raw archives lives here; turning the pairs
//! into an image-caption dataset is the materializer's job.

pub mod cifar;

use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

pub use cifar::load_split;

/// One (image, label index) pair from a source dataset. Read-only,
/// iterated once per materialization run.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub image: RgbImage,
    /// Index into the configured label table.
    pub label: usize,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("truncated batch file {path:?}: {got} bytes is not a whole number of records")]
    TruncatedBatch { path: PathBuf, got: u64 },

    #[error("record {index} has label byte {label}, expected 0..={max}")]
    LabelOutOfRange { index: usize, label: u8, max: u8 },

    #[error("checksum mismatch for {path:?}: expected {expected}, got {got}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        got: String,
    },

    #[error("batch file {0:?} missing after extraction")]
    MissingBatch(PathBuf),

    #[error("unknown split {0:?}")]
    UnknownSplit(String),
}

//! Per-run working set shared between enrichers.

use super::ImageAnalysis;
use crate::errors::StageError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

/// Decoded image bytes with their pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// An already stored photo with the same image hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub photo_id: Uuid,
    /// Where the stored copy lives, e.g. `"2019/beach.jpg in storage 'nas'"`.
    pub location: Option<String>,
}

impl fmt::Display for DuplicateMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "photo {} at {location}", self.photo_id),
            None => write!(f, "photo {} (location unknown)", self.photo_id),
        }
    }
}

/// Intermediate artifacts produced by data-provider enrichers.
///
/// Every slot is a write-once cell owned by one upstream enricher. The working
/// set is never persisted and is dropped by the caller after the run.
#[derive(Debug, Default)]
pub struct SourceData {
    absolute_path: PathBuf,
    original: OnceLock<ImageData>,
    preview: OnceLock<ImageData>,
    analysis: OnceLock<ImageAnalysis>,
    duplicate: OnceLock<DuplicateMatch>,
}

macro_rules! slot {
    ($set:ident, $get:ident, $require:ident, $field:ident, $ty:ty) => {
        /// Populates the slot; fails if it was already written.
        pub fn $set(&self, value: $ty) -> Result<(), StageError> {
            self.$field
                .set(value)
                .map_err(|_| StageError::InputAlreadySet(stringify!($field)))
        }

        /// Returns the slot value, if populated.
        #[must_use]
        pub fn $get(&self) -> Option<&$ty> {
            self.$field.get()
        }

        /// Returns the slot value or a missing-input error.
        pub fn $require(&self) -> Result<&$ty, StageError> {
            self.$field
                .get()
                .ok_or(StageError::MissingInput(stringify!($field)))
        }
    };
}

impl SourceData {
    /// Creates a working set for the file at `absolute_path`.
    #[must_use]
    pub fn new(absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            ..Self::default()
        }
    }

    /// Path of the original file.
    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    slot!(set_original, original, require_original, original, ImageData);
    slot!(set_preview, preview, require_preview, preview, ImageData);
    slot!(set_analysis, analysis, require_analysis, analysis, ImageAnalysis);
    slot!(set_duplicate, duplicate, require_duplicate, duplicate, DuplicateMatch);
}

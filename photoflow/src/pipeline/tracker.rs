//! Applies completed stages to the photo and extends the completion marker.

use crate::core::{EnricherKind, EnricherSet};
use crate::model::Photo;
use crate::stages::PhotoPatch;
use parking_lot::RwLock;
use std::sync::Arc;

/// Single writer of the photo during a run.
///
/// Only the scheduler's driver loop calls [`CompletionTracker::record_success`],
/// so patches are applied one at a time and the marker bit is set under the
/// same write lock as the patch.
#[derive(Debug)]
pub struct CompletionTracker {
    photo: Arc<RwLock<Photo>>,
    applied: EnricherSet,
}

impl CompletionTracker {
    /// Creates a tracker over the shared photo.
    #[must_use]
    pub fn new(photo: Arc<RwLock<Photo>>) -> Self {
        Self {
            photo,
            applied: EnricherSet::empty(),
        }
    }

    /// Applies `patch` and adds `kind` to the completion marker.
    pub fn record_success(&mut self, kind: EnricherKind, patch: PhotoPatch) {
        let mut photo = self.photo.write();
        patch.apply(&mut photo);
        photo.mark_enriched(kind);
        self.applied.insert(kind.flag());
    }

    /// Kinds applied during this run.
    #[must_use]
    pub const fn applied(&self) -> EnricherSet {
        self.applied
    }

    /// The photo's current completion marker.
    #[must_use]
    pub fn marker(&self) -> EnricherSet {
        self.photo.read().enriched_with
    }
}

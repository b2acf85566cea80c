//! Detection of photos that are already stored.

use super::{EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::providers::DuplicateFinder;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Preview];

/// Looks up a stored photo with the same image hash.
///
/// A match is written to the `duplicate` working-set slot; the photo itself is
/// left untouched. Pair it with [`crate::pipeline::DuplicateStopCondition`] to
/// end the run once a duplicate is known.
#[derive(Clone)]
pub struct DuplicateEnricher {
    finder: Arc<dyn DuplicateFinder>,
}

impl DuplicateEnricher {
    #[must_use]
    pub fn new(finder: Arc<dyn DuplicateFinder>) -> Self {
        Self { finder }
    }
}

impl std::fmt::Debug for DuplicateEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateEnricher").finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for DuplicateEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Duplicate
    }

    fn dependencies(&self) -> &[EnricherKind] {
        DEPENDENCIES
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        let (photo_id, hash) = ctx.read_photo(|photo| (photo.id, photo.image_hash.clone()));
        let Some(hash) = hash.filter(|h| !h.trim().is_empty()) else {
            return Ok(PhotoPatch::none());
        };

        if let Some(found) = self.finder.find_by_hash(&hash, photo_id).await? {
            info!(%photo_id, duplicate = %found, "Duplicate photo found");
            ctx.source().set_duplicate(found)?;
        }
        Ok(PhotoPatch::none())
    }
}

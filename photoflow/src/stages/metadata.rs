//! EXIF and file metadata.

use super::{EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::providers::MetadataReader;
use async_trait::async_trait;
use std::sync::Arc;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Preview];

/// Records the taken date and location read from the original file.
#[derive(Clone)]
pub struct MetadataEnricher {
    reader: Arc<dyn MetadataReader>,
}

impl MetadataEnricher {
    #[must_use]
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self { reader }
    }
}

impl std::fmt::Debug for MetadataEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEnricher").finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for MetadataEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Metadata
    }

    fn dependencies(&self) -> &[EnricherKind] {
        DEPENDENCIES
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        let metadata = self.reader.read(ctx.source().absolute_path()).await?;
        Ok(PhotoPatch::new(move |photo| {
            photo.taken_date = metadata.taken_date;
            photo.location = metadata.location;
        }))
    }
}

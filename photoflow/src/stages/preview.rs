//! Decodes the original and produces the working preview.

use super::{blob_info, EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::providers::{ImageProcessor, ProviderError};
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Root enricher: loads the original, derives the preview and records its
/// dimensions, orientation, scale and content hashes.
///
/// Populates the `original` and `preview` working-set slots.
#[derive(Clone)]
pub struct PreviewEnricher {
    images: Arc<dyn ImageProcessor>,
    retry: RetryConfig,
}

impl PreviewEnricher {
    #[must_use]
    pub fn new(images: Arc<dyn ImageProcessor>, retry: RetryConfig) -> Self {
        Self { images, retry }
    }
}

impl std::fmt::Debug for PreviewEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewEnricher").finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for PreviewEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Preview
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &[]
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        let path = ctx.source().absolute_path().to_path_buf();
        let original = with_retry(&self.retry, "load_original", ProviderError::is_retryable, || {
            self.images.load_original(&path)
        })
        .await?;
        let preview = self.images.make_preview(&original).await?;

        let image_hash = blob_info(&original.bytes).sha256;
        let preview_blob = blob_info(&preview.image.bytes);
        let (width, height) = (original.width, original.height);
        let (scale, orientation) = (preview.scale, preview.orientation);

        ctx.source().set_original(original)?;
        ctx.source().set_preview(preview.image)?;

        Ok(PhotoPatch::new(move |photo| {
            photo.width = Some(width);
            photo.height = Some(height);
            photo.orientation = orientation;
            photo.scale = scale;
            photo.image_hash = Some(image_hash);
            photo.preview = Some(preview_blob);
        }))
    }
}

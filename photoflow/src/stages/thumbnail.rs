//! Small thumbnail rendering.

use super::{blob_info, EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::providers::ThumbnailGenerator;
use async_trait::async_trait;
use std::sync::Arc;

/// Edge length of generated thumbnails, in pixels.
pub const THUMBNAIL_SIZE: u32 = 50;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Preview];

/// Renders a thumbnail from the preview unless the photo already has one.
#[derive(Clone)]
pub struct ThumbnailEnricher {
    generator: Arc<dyn ThumbnailGenerator>,
}

impl ThumbnailEnricher {
    #[must_use]
    pub fn new(generator: Arc<dyn ThumbnailGenerator>) -> Self {
        Self { generator }
    }
}

impl std::fmt::Debug for ThumbnailEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailEnricher").finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for ThumbnailEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Thumbnail
    }

    fn dependencies(&self) -> &[EnricherKind] {
        DEPENDENCIES
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        if ctx.read_photo(|photo| photo.thumbnail.is_some()) {
            return Ok(PhotoPatch::none());
        }

        let preview = ctx.source().require_preview()?;
        let bytes = self
            .generator
            .thumbnail(preview, THUMBNAIL_SIZE, THUMBNAIL_SIZE)
            .await?;
        let info = blob_info(&bytes);

        Ok(PhotoPatch::new(move |photo| {
            photo.thumbnail = Some(info);
            photo.thumbnail_image = Some(bytes);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Photo;
    use crate::providers::MockThumbnailGenerator;
    use crate::testing::fixtures::context_with_preview;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_thumbnail_generated() {
        let mut generator = MockThumbnailGenerator::new();
        generator
            .expect_thumbnail()
            .with(mockall::predicate::always(), eq(THUMBNAIL_SIZE), eq(THUMBNAIL_SIZE))
            .times(1)
            .returning(|_, _, _| Ok(vec![7; 32]));

        let enricher = ThumbnailEnricher::new(Arc::new(generator));
        let ctx = context_with_preview(EnricherKind::Thumbnail, Photo::new("a.jpg"));

        let mut photo = Photo::new("a.jpg");
        enricher.enrich(&ctx).await.unwrap().apply(&mut photo);
        assert_eq!(photo.thumbnail.as_ref().unwrap().size, 32);
        assert_eq!(photo.thumbnail_image.as_deref(), Some(&[7u8; 32][..]));
    }

    #[tokio::test]
    async fn test_existing_thumbnail_is_kept() {
        let mut generator = MockThumbnailGenerator::new();
        generator.expect_thumbnail().never();

        let mut photo = Photo::new("a.jpg");
        photo.thumbnail = Some(blob_info(b"old"));
        let ctx = context_with_preview(EnricherKind::Thumbnail, photo);

        let enricher = ThumbnailEnricher::new(Arc::new(generator));
        assert!(enricher.enrich(&ctx).await.unwrap().is_empty());
    }
}

//! Cloud vision analysis.

use super::{EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::providers::{ProviderError, VisionClient};
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Preview];

/// Sends the preview to the vision provider and stores the raw result in the
/// `analysis` working-set slot. The photo itself is not modified.
#[derive(Clone)]
pub struct AnalyzeEnricher {
    vision: Arc<dyn VisionClient>,
    retry: RetryConfig,
}

impl AnalyzeEnricher {
    #[must_use]
    pub fn new(vision: Arc<dyn VisionClient>, retry: RetryConfig) -> Self {
        Self { vision, retry }
    }
}

impl std::fmt::Debug for AnalyzeEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzeEnricher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for AnalyzeEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Analyze
    }

    fn dependencies(&self) -> &[EnricherKind] {
        DEPENDENCIES
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        let preview = ctx.source().require_preview()?;
        let analysis = with_retry(&self.retry, "vision.analyze", ProviderError::is_retryable, || {
            self.vision.analyze(preview)
        })
        .await?;

        debug!(
            tags = analysis.tags.len(),
            objects = analysis.objects.len(),
            "Vision analysis received"
        );
        ctx.source().set_analysis(analysis)?;
        Ok(PhotoPatch::none())
    }
}

//! Face detection and identification.

use super::{EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::face::{FaceIdentificationConfig, FaceIdentifier};
use crate::model::{Face, FaceIdentifyStatus, IdentityStatus};
use crate::providers::{FaceDetector, PersonDirectory, ProviderError};
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Preview, EnricherKind::Metadata];

/// Detects faces on the preview and matches each one to a known person.
///
/// Depends on metadata for the taken date used by the birth-date constraint
/// and on the preview for the image and its scale.
#[derive(Clone)]
pub struct FaceEnricher {
    detector: Arc<dyn FaceDetector>,
    persons: Arc<dyn PersonDirectory>,
    config: FaceIdentificationConfig,
    retry: RetryConfig,
}

impl FaceEnricher {
    #[must_use]
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        persons: Arc<dyn PersonDirectory>,
        config: FaceIdentificationConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            detector,
            persons,
            config,
            retry,
        }
    }

    async fn load_identifier(&self) -> Result<FaceIdentifier, ProviderError> {
        let persons = with_retry(&self.retry, "persons", ProviderError::is_retryable, || {
            self.persons.persons()
        })
        .await?;
        let embeddings = with_retry(&self.retry, "embeddings", ProviderError::is_retryable, || {
            self.persons.embeddings()
        })
        .await?;
        Ok(FaceIdentifier::from_directory(
            self.config.clone(),
            persons,
            embeddings,
        ))
    }
}

impl std::fmt::Debug for FaceEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceEnricher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Enricher for FaceEnricher {
    fn kind(&self) -> EnricherKind {
        EnricherKind::Face
    }

    fn dependencies(&self) -> &[EnricherKind] {
        DEPENDENCIES
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        let preview = ctx.source().require_preview()?;
        let detected = with_retry(&self.retry, "faces.detect", ProviderError::is_retryable, || {
            self.detector.detect(preview)
        })
        .await?;

        if detected.is_empty() {
            return Ok(PhotoPatch::new(|photo| {
                photo.faces.clear();
                photo.face_identify_status = FaceIdentifyStatus::NotDetected;
            }));
        }

        ctx.ensure_not_cancelled()?;
        let identifier = self.load_identifier().await?;
        let (scale, taken) = ctx.read_photo(|photo| (photo.scale, photo.taken_date));

        let faces: Vec<Face> = detected
            .into_iter()
            .map(|face| {
                let identification = identifier.identify_face(&face, scale, taken);
                Face::from_detection(face, identification)
            })
            .collect();

        debug!(
            detected = faces.len(),
            identified = faces
                .iter()
                .filter(|f| f.identity_status == IdentityStatus::Identified)
                .count(),
            "Faces processed"
        );

        Ok(PhotoPatch::new(move |photo| {
            photo.faces = faces;
            photo.face_identify_status = FaceIdentifyStatus::Detected;
        }))
    }
}

//! The enricher contract and the concrete enrichers.
//!
//! An enricher declares its [`EnricherKind`] and the kinds it depends on. The
//! scheduler runs it once all dependencies are terminal; on success the
//! returned [`PhotoPatch`] is applied to the photo by the completion tracker.

mod analyze;
mod derived;
mod duplicate;
mod face;
mod metadata;
mod preview;
mod thumbnail;

pub use analyze::AnalyzeEnricher;
pub use derived::{
    AdultEnricher, CaptionEnricher, CategoryEnricher, ColorEnricher, ObjectPropertyEnricher,
    TagEnricher,
};
pub use duplicate::DuplicateEnricher;
pub use face::FaceEnricher;
pub use metadata::MetadataEnricher;
pub use preview::PreviewEnricher;
pub use thumbnail::{ThumbnailEnricher, THUMBNAIL_SIZE};

use crate::cancellation::CancellationToken;
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::model::{BlobInfo, Photo, SourceData};
use crate::providers::{
    DuplicateFinder, FaceDetector, ImageProcessor, MetadataReader, PersonDirectory,
    ThumbnailGenerator, VisionClient,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// A deferred mutation of the photo produced by one enricher.
///
/// Patches are applied by the completion tracker in the same step that marks
/// the enricher as completed, so a stage never writes the photo directly.
#[derive(Default)]
pub struct PhotoPatch(Option<Box<dyn FnOnce(&mut Photo) + Send>>);

impl PhotoPatch {
    /// A patch that leaves the photo untouched.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps a mutation.
    #[must_use]
    pub fn new(apply: impl FnOnce(&mut Photo) + Send + 'static) -> Self {
        Self(Some(Box::new(apply)))
    }

    /// Returns true if the patch does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Applies the patch.
    pub fn apply(self, photo: &mut Photo) {
        if let Some(apply) = self.0 {
            apply(photo);
        }
    }
}

impl Debug for PhotoPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PhotoPatch")
            .field(&if self.is_empty() { "none" } else { "fn" })
            .finish()
    }
}

/// Everything an enricher can see while it runs.
#[derive(Clone)]
pub struct EnrichContext {
    kind: EnricherKind,
    run_id: Uuid,
    photo: Arc<RwLock<Photo>>,
    source: Arc<SourceData>,
    cancel: Arc<CancellationToken>,
}

impl EnrichContext {
    /// Creates a context for one stage of one run.
    #[must_use]
    pub fn new(
        kind: EnricherKind,
        run_id: Uuid,
        photo: Arc<RwLock<Photo>>,
        source: Arc<SourceData>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            kind,
            run_id,
            photo,
            source,
            cancel,
        }
    }

    /// The kind of the running enricher.
    #[must_use]
    pub const fn kind(&self) -> EnricherKind {
        self.kind
    }

    /// The id of the current run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Reads the photo under a short shared lock.
    ///
    /// The closure must not block; the lock cannot be held across `.await`.
    pub fn read_photo<R>(&self, f: impl FnOnce(&Photo) -> R) -> R {
        f(&self.photo.read())
    }

    /// The working set shared with the other enrichers of this run.
    #[must_use]
    pub fn source(&self) -> &SourceData {
        &self.source
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`StageError::Cancelled`] if the run was cancelled.
    pub fn ensure_not_cancelled(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled(
                self.cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }
        Ok(())
    }
}

impl Debug for EnrichContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichContext")
            .field("kind", &self.kind)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// A pluggable enrichment stage.
#[async_trait]
pub trait Enricher: Send + Sync + Debug {
    /// The kind tag; unique within a catalog.
    fn kind(&self) -> EnricherKind;

    /// Kinds that must reach a terminal state before this one starts.
    fn dependencies(&self) -> &[EnricherKind];

    /// Runs the enricher and returns the mutation to apply on success.
    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError>;
}

/// A synchronous closure-based enricher.
pub struct FnEnricher<F>
where
    F: Fn(&EnrichContext) -> Result<PhotoPatch, StageError> + Send + Sync,
{
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
    func: F,
}

impl<F> FnEnricher<F>
where
    F: Fn(&EnrichContext) -> Result<PhotoPatch, StageError> + Send + Sync,
{
    /// Creates a new closure-based enricher.
    pub fn new(kind: EnricherKind, dependencies: Vec<EnricherKind>, func: F) -> Self {
        Self {
            kind,
            dependencies,
            func,
        }
    }
}

impl<F> Debug for FnEnricher<F>
where
    F: Fn(&EnrichContext) -> Result<PhotoPatch, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEnricher")
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[async_trait]
impl<F> Enricher for FnEnricher<F>
where
    F: Fn(&EnrichContext) -> Result<PhotoPatch, StageError> + Send + Sync,
{
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        (self.func)(ctx)
    }
}

/// External collaborators of the standard enrichers.
#[derive(Clone)]
pub struct Providers {
    pub images: Arc<dyn ImageProcessor>,
    pub metadata: Arc<dyn MetadataReader>,
    pub vision: Arc<dyn VisionClient>,
    pub faces: Arc<dyn FaceDetector>,
    pub thumbnails: Arc<dyn ThumbnailGenerator>,
    pub persons: Arc<dyn PersonDirectory>,
    pub duplicates: Arc<dyn DuplicateFinder>,
}

impl Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

/// Hash and size of a blob.
#[must_use]
pub fn blob_info(bytes: &[u8]) -> BlobInfo {
    BlobInfo {
        sha256: hex::encode(Sha256::digest(bytes)),
        size: bytes.len() as u64,
    }
}

//! Ports to the external collaborators consumed by the enrichers.
//!
//! Concrete vision/face providers, image codecs and the person store live
//! outside this crate; enrichers only see these traits.

use crate::model::{
    DetectedFace, DuplicateMatch, GeoPoint, ImageAnalysis, ImageData, Person, PersonEmbedding,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network hiccup or timeout.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The provider answered with something that could not be interpreted.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Returns true for failures that are worth retrying: transient errors and
    /// HTTP 429/502/503/504.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Http { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            Self::InvalidResponse(_) | Self::NotFound(_) => false,
        }
    }
}

/// A preview derived from the original image.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub image: ImageData,
    /// Preview size divided by original size.
    pub scale: f64,
    /// EXIF orientation of the original, if present.
    pub orientation: Option<i32>,
}

/// Metadata extracted from the original file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageMetadata {
    pub taken_date: Option<NaiveDateTime>,
    pub location: Option<GeoPoint>,
}

/// Decodes originals and produces the working preview.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Loads and decodes the original file.
    async fn load_original(&self, path: &Path) -> Result<ImageData, ProviderError>;

    /// Produces the resized, orientation-corrected preview.
    async fn make_preview(&self, original: &ImageData) -> Result<PreviewImage, ProviderError>;
}

/// Reads EXIF and file metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<ImageMetadata, ProviderError>;
}

/// Cloud vision analysis of a preview.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(&self, preview: &ImageData) -> Result<ImageAnalysis, ProviderError>;
}

/// Detects faces and computes their embeddings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, preview: &ImageData) -> Result<Vec<DetectedFace>, ProviderError>;
}

/// Renders small thumbnails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Returns encoded thumbnail bytes no larger than `width` x `height`.
    async fn thumbnail(
        &self,
        preview: &ImageData,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Known persons and their reference embeddings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonDirectory: Send + Sync {
    async fn persons(&self) -> Result<Vec<Person>, ProviderError>;

    async fn embeddings(&self) -> Result<Vec<PersonEmbedding>, ProviderError>;
}

/// Lookup of stored photos by image hash.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DuplicateFinder: Send + Sync {
    /// Returns a stored photo other than `exclude` whose hash equals
    /// `image_hash`.
    async fn find_by_hash(
        &self,
        image_hash: &str,
        exclude: Uuid,
    ) -> Result<Option<DuplicateMatch>, ProviderError>;
}

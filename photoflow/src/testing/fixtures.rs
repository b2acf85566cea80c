//! Ready-made photos, working sets, contexts and stub providers.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::core::EnricherKind;
use crate::model::{
    AdultInfo, CaptionScore, CategoryScore, ColorInfo, DetectedFace, DuplicateMatch, FaceBox,
    ImageAnalysis, ImageData, Person, PersonEmbedding, Photo, SourceData, TagScore,
};
use crate::providers::{
    DuplicateFinder, FaceDetector, ImageMetadata, ImageProcessor, MetadataReader,
    PersonDirectory, PreviewImage, ProviderError, ThumbnailGenerator, VisionClient,
};
use crate::stages::{EnrichContext, Providers};

/// Path used by every fixture working set.
pub const FIXTURE_PATH: &str = "/photos/fixture.jpg";

/// An opaque image of the given size.
#[must_use]
pub fn image(width: u32, height: u32) -> ImageData {
    ImageData {
        bytes: vec![7; (width as usize * height as usize).min(256)],
        width,
        height,
    }
}

/// Midnight of the given day, or `None` for an invalid date.
#[must_use]
pub fn taken_at(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// An analysis result with one entry of every kind.
#[must_use]
pub fn sample_analysis() -> ImageAnalysis {
    ImageAnalysis {
        tags: vec![
            TagScore {
                name: "beach".into(),
                confidence: 0.95,
            },
            TagScore {
                name: "sky".into(),
                confidence: 0.88,
            },
        ],
        categories: vec![CategoryScore {
            name: "outdoor_".into(),
            score: 0.7,
        }],
        captions: vec![CaptionScore {
            text: "a sandy beach under a blue sky".into(),
            confidence: 0.81,
        }],
        objects: Vec::new(),
        color: Some(ColorInfo {
            is_bw: false,
            accent_color: "1E90FF".into(),
            dominant_background: "Blue".into(),
            dominant_foreground: "White".into(),
            dominant_colors: vec!["Blue".into(), "White".into()],
        }),
        adult: Some(AdultInfo {
            is_adult: false,
            adult_score: 0.01,
            is_racy: false,
            racy_score: 0.02,
        }),
    }
}

fn context(kind: EnricherKind, photo: Photo, source: SourceData) -> EnrichContext {
    EnrichContext::new(
        kind,
        Uuid::new_v4(),
        Arc::new(RwLock::new(photo)),
        Arc::new(source),
        Arc::new(CancellationToken::new()),
    )
}

/// A context with an empty working set.
#[must_use]
pub fn context_for(kind: EnricherKind, photo: Photo) -> EnrichContext {
    context(kind, photo, SourceData::new(FIXTURE_PATH))
}

/// A context whose working set already holds an original and a 400x300 preview.
#[must_use]
pub fn context_with_preview(kind: EnricherKind, photo: Photo) -> EnrichContext {
    let source = SourceData::new(FIXTURE_PATH);
    // A fresh working set accepts both writes.
    let _ = source.set_original(image(800, 600));
    let _ = source.set_preview(image(400, 300));
    context(kind, photo, source)
}

/// A context whose working set holds a preview and the given analysis.
#[must_use]
pub fn context_with_analysis(
    kind: EnricherKind,
    photo: Photo,
    analysis: ImageAnalysis,
) -> EnrichContext {
    let source = SourceData::new(FIXTURE_PATH);
    let _ = source.set_preview(image(400, 300));
    let _ = source.set_analysis(analysis);
    context(kind, photo, source)
}

/// Deterministic in-memory implementation of every provider port.
///
/// The original is 800x600 with a half-size preview, one face of
/// "Alice" (born 1985) is detected, analysis returns [`sample_analysis`],
/// and no photo is ever a duplicate.
#[derive(Debug, Clone, Default)]
pub struct StubProviders;

impl StubProviders {
    /// The single person known to the stub directory.
    #[must_use]
    pub fn alice() -> Person {
        Person {
            id: 1,
            name: "Alice".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 3, 2),
        }
    }

    fn embedding() -> Vec<f32> {
        vec![0.6, 0.8, 0.0]
    }
}

#[async_trait]
impl ImageProcessor for StubProviders {
    async fn load_original(&self, _path: &Path) -> Result<ImageData, ProviderError> {
        Ok(image(800, 600))
    }

    async fn make_preview(&self, original: &ImageData) -> Result<PreviewImage, ProviderError> {
        Ok(PreviewImage {
            image: image(original.width / 2, original.height / 2),
            scale: 0.5,
            orientation: Some(1),
        })
    }
}

#[async_trait]
impl MetadataReader for StubProviders {
    async fn read(&self, _path: &Path) -> Result<ImageMetadata, ProviderError> {
        Ok(ImageMetadata {
            taken_date: taken_at(2020, 6, 1),
            location: None,
        })
    }
}

#[async_trait]
impl VisionClient for StubProviders {
    async fn analyze(&self, _preview: &ImageData) -> Result<ImageAnalysis, ProviderError> {
        Ok(sample_analysis())
    }
}

#[async_trait]
impl FaceDetector for StubProviders {
    async fn detect(&self, _preview: &ImageData) -> Result<Vec<DetectedFace>, ProviderError> {
        Ok(vec![DetectedFace {
            bounding_box: FaceBox {
                left: 10,
                top: 10,
                width: 60,
                height: 60,
            },
            embedding: Self::embedding(),
            age: Some(35.0),
            gender: Some("female".into()),
            smile: None,
        }])
    }
}

#[async_trait]
impl ThumbnailGenerator for StubProviders {
    async fn thumbnail(
        &self,
        _preview: &ImageData,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(vec![1; (width * height / 100) as usize])
    }
}

#[async_trait]
impl PersonDirectory for StubProviders {
    async fn persons(&self) -> Result<Vec<Person>, ProviderError> {
        Ok(vec![Self::alice()])
    }

    async fn embeddings(&self) -> Result<Vec<PersonEmbedding>, ProviderError> {
        Ok(vec![PersonEmbedding {
            person_id: 1,
            embedding: Self::embedding(),
        }])
    }
}

#[async_trait]
impl DuplicateFinder for StubProviders {
    async fn find_by_hash(
        &self,
        _image_hash: &str,
        _exclude: Uuid,
    ) -> Result<Option<DuplicateMatch>, ProviderError> {
        Ok(None)
    }
}

/// Reports every hashed photo as a copy of one stored photo.
#[derive(Debug, Clone)]
pub struct KnownDuplicate(pub DuplicateMatch);

#[async_trait]
impl DuplicateFinder for KnownDuplicate {
    async fn find_by_hash(
        &self,
        _image_hash: &str,
        _exclude: Uuid,
    ) -> Result<Option<DuplicateMatch>, ProviderError> {
        Ok(Some(self.0.clone()))
    }
}

/// [`Providers`] backed entirely by [`StubProviders`].
#[must_use]
pub fn stub_providers() -> Providers {
    let stub = Arc::new(StubProviders);
    Providers {
        images: stub.clone(),
        metadata: stub.clone(),
        vision: stub.clone(),
        faces: stub.clone(),
        thumbnails: stub.clone(),
        persons: stub.clone(),
        duplicates: stub,
    }
}

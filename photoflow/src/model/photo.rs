//! The photo aggregate mutated by enrichers.

use super::{ColorInfo, Face, FaceIdentifyStatus, Rect};
use crate::core::{EnricherKind, EnricherSet};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content hash and size of a stored image blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Lower-case hex sha256 of the blob.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
}

/// Geographic coordinate read from metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A tag attached to the photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoTag {
    pub name: String,
    pub confidence: f64,
}

/// A category attached to the photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoCategory {
    pub name: String,
    pub score: f64,
}

/// A caption attached to the photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    pub confidence: f64,
}

/// A detected object stored on the photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub name: String,
    pub confidence: f64,
    pub rect: Rect,
}

/// The target aggregate produced by enrichment.
///
/// Each collection is written by exactly one enricher kind; see
/// [`Photo::clear_enrichment`] for the ownership map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub name: String,
    pub relative_path: Option<String>,
    pub taken_date: Option<NaiveDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Option<i32>,
    /// Ratio of preview size to original size.
    pub scale: f64,
    pub preview: Option<BlobInfo>,
    pub thumbnail: Option<BlobInfo>,
    /// Encoded thumbnail bytes.
    pub thumbnail_image: Option<Vec<u8>>,
    pub image_hash: Option<String>,
    pub location: Option<GeoPoint>,
    pub faces: Vec<Face>,
    pub tags: Vec<PhotoTag>,
    pub categories: Vec<PhotoCategory>,
    pub captions: Vec<Caption>,
    pub object_properties: Vec<ObjectProperty>,
    pub colors: Option<ColorInfo>,
    pub is_adult_content: bool,
    pub adult_score: f64,
    pub is_racy_content: bool,
    pub racy_score: f64,
    pub face_identify_status: FaceIdentifyStatus,
    /// Completion marker.
    pub enriched_with: EnricherSet,
}

impl Default for Photo {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            relative_path: None,
            taken_date: None,
            width: None,
            height: None,
            orientation: None,
            scale: 1.0,
            preview: None,
            thumbnail: None,
            thumbnail_image: None,
            image_hash: None,
            location: None,
            faces: Vec::new(),
            tags: Vec::new(),
            categories: Vec::new(),
            captions: Vec::new(),
            object_properties: Vec::new(),
            colors: None,
            is_adult_content: false,
            adult_score: 0.0,
            is_racy_content: false,
            racy_score: 0.0,
            face_identify_status: FaceIdentifyStatus::Undefined,
            enriched_with: EnricherSet::empty(),
        }
    }
}

impl Photo {
    /// Creates an empty photo with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if the completion marker contains `kind`.
    #[must_use]
    pub const fn is_enriched_with(&self, kind: EnricherKind) -> bool {
        self.enriched_with.has(kind)
    }

    /// Marks `kind` as applied.
    pub fn mark_enriched(&mut self, kind: EnricherKind) {
        self.enriched_with.insert(kind.flag());
    }

    /// Drops the data owned by `kind` and clears its completion bit, so the
    /// enricher can be run again from scratch.
    pub fn clear_enrichment(&mut self, kind: EnricherKind) {
        match kind {
            EnricherKind::Preview => {
                self.preview = None;
                self.image_hash = None;
                self.width = None;
                self.height = None;
                self.orientation = None;
                self.scale = 1.0;
            }
            EnricherKind::Metadata => {
                self.taken_date = None;
                self.location = None;
            }
            EnricherKind::Analyze | EnricherKind::Duplicate => {}
            EnricherKind::Tag => self.tags.clear(),
            EnricherKind::Category => self.categories.clear(),
            EnricherKind::Caption => self.captions.clear(),
            EnricherKind::ObjectProperty => self.object_properties.clear(),
            EnricherKind::Color => self.colors = None,
            EnricherKind::Adult => {
                self.is_adult_content = false;
                self.adult_score = 0.0;
                self.is_racy_content = false;
                self.racy_score = 0.0;
            }
            EnricherKind::Face => {
                self.faces.clear();
                self.face_identify_status = FaceIdentifyStatus::Undefined;
            }
            EnricherKind::Thumbnail => {
                self.thumbnail = None;
                self.thumbnail_image = None;
            }
        }
        self.enriched_with.remove(kind.flag());
    }
}

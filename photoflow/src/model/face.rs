//! Face and person records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identification outcome for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    #[default]
    NotIdentified,
    Identified,
}

/// Photo-level outcome of the face stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceIdentifyStatus {
    /// The face stage has not run.
    #[default]
    Undefined,
    /// The detector found no faces.
    NotDetected,
    /// Faces were detected and identification was attempted.
    Detected,
}

/// Face bounding box in preview pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaceBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Size of the box in original-image pixels, given the preview scale.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn original_size(&self, scale: f64) -> (u32, u32) {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let w = (f64::from(self.width) / scale).round() as u32;
        let h = (f64::from(self.height) / scale).round() as u32;
        (w, h)
    }
}

/// A face as returned by the detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounding_box: FaceBox,
    pub embedding: Vec<f32>,
    pub age: Option<f32>,
    pub gender: Option<String>,
    pub smile: Option<f32>,
}

/// Result of matching one face against known persons.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Identification {
    pub status: IdentityStatus,
    pub person_id: Option<i64>,
    pub confidence: f32,
}

impl Identification {
    /// An unmatched face.
    #[must_use]
    pub const fn not_identified() -> Self {
        Self {
            status: IdentityStatus::NotIdentified,
            person_id: None,
            confidence: 0.0,
        }
    }

    /// A face matched to `person_id` with the given similarity.
    #[must_use]
    pub const fn identified(person_id: i64, confidence: f32) -> Self {
        Self {
            status: IdentityStatus::Identified,
            person_id: Some(person_id),
            confidence,
        }
    }
}

/// A face stored on the photo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Face {
    pub bounding_box: FaceBox,
    pub embedding: Vec<f32>,
    pub age: Option<f32>,
    pub gender: Option<String>,
    pub smile: Option<f32>,
    pub identity_status: IdentityStatus,
    pub person_id: Option<i64>,
    pub identified_with_confidence: f32,
}

impl Face {
    /// Builds a stored face from a detection and its identification.
    #[must_use]
    pub fn from_detection(detected: DetectedFace, identification: Identification) -> Self {
        Self {
            bounding_box: detected.bounding_box,
            embedding: detected.embedding,
            age: detected.age,
            gender: detected.gender,
            smile: detected.smile,
            identity_status: identification.status,
            person_id: identification.person_id,
            identified_with_confidence: identification.confidence,
        }
    }
}

/// A known person that faces can be matched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// One stored reference embedding of a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonEmbedding {
    pub person_id: i64,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_size_divides_by_scale() {
        let face_box = FaceBox {
            left: 0,
            top: 0,
            width: 18,
            height: 20,
        };
        assert_eq!(face_box.original_size(0.5), (36, 40));
        assert_eq!(face_box.original_size(0.0), (18, 20));
    }

    #[test]
    fn test_from_detection_copies_identification() {
        let face = Face::from_detection(
            DetectedFace {
                embedding: vec![1.0, 0.0],
                ..DetectedFace::default()
            },
            Identification::identified(7, 0.9),
        );
        assert_eq!(face.identity_status, IdentityStatus::Identified);
        assert_eq!(face.person_id, Some(7));
        assert_eq!(face.embedding, vec![1.0, 0.0]);
    }
}

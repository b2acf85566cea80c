//! Matching detected faces to known persons.

use super::embedding::l2_normalize;
use super::index::{EmbeddingIndex, FlatIndex};
use crate::model::{DetectedFace, Identification, Person, PersonEmbedding};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

fn default_threshold() -> f32 {
    0.6
}

fn default_anchor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default()
}

fn default_max_candidates() -> usize {
    5
}

fn default_min_face_size() -> u32 {
    36
}

/// Tuning of face identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceIdentificationConfig {
    /// Minimum cosine similarity for a match.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// The birth-date constraint only applies to photos taken after this date.
    #[serde(default = "default_anchor_date")]
    pub anchor_date: NaiveDate,
    /// How many nearest persons to consider.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Faces narrower or shorter than this (in original pixels) are not matched.
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
}

impl Default for FaceIdentificationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            anchor_date: default_anchor_date(),
            max_candidates: default_max_candidates(),
            min_face_size: default_min_face_size(),
        }
    }
}

impl FaceIdentificationConfig {
    /// Sets the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the anchor date of the birth-date constraint.
    #[must_use]
    pub fn with_anchor_date(mut self, anchor_date: NaiveDate) -> Self {
        self.anchor_date = anchor_date;
        self
    }

    /// Sets the number of candidates to consider.
    #[must_use]
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Sets the minimum face size.
    #[must_use]
    pub fn with_min_face_size(mut self, min_face_size: u32) -> Self {
        self.min_face_size = min_face_size;
        self
    }
}

/// Identifies faces against an embedding index and a person directory.
pub struct FaceIdentifier {
    config: FaceIdentificationConfig,
    index: Arc<dyn EmbeddingIndex>,
    persons: HashMap<i64, Person>,
}

impl std::fmt::Debug for FaceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceIdentifier")
            .field("config", &self.config)
            .field("embeddings", &self.index.len())
            .field("persons", &self.persons.len())
            .finish()
    }
}

impl FaceIdentifier {
    /// Creates an identifier over an existing index.
    #[must_use]
    pub fn new(
        config: FaceIdentificationConfig,
        index: Arc<dyn EmbeddingIndex>,
        persons: impl IntoIterator<Item = Person>,
    ) -> Self {
        Self {
            config,
            index,
            persons: persons.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// Creates an identifier backed by an exact [`FlatIndex`].
    #[must_use]
    pub fn from_directory(
        config: FaceIdentificationConfig,
        persons: Vec<Person>,
        embeddings: Vec<PersonEmbedding>,
    ) -> Self {
        Self::new(config, Arc::new(FlatIndex::from_embeddings(embeddings)), persons)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FaceIdentificationConfig {
        &self.config
    }

    /// Returns true if the face is large enough, after undoing the preview
    /// scale, to be matched reliably.
    #[must_use]
    pub fn is_identifiable(&self, face: &DetectedFace, scale: f64) -> bool {
        let (width, height) = face.bounding_box.original_size(scale);
        width >= self.config.min_face_size && height >= self.config.min_face_size
    }

    /// Identifies a detected face, honouring the minimum face size.
    #[must_use]
    pub fn identify_face(
        &self,
        face: &DetectedFace,
        scale: f64,
        taken: Option<NaiveDateTime>,
    ) -> Identification {
        if face.embedding.is_empty() || !self.is_identifiable(face, scale) {
            return Identification::not_identified();
        }
        self.identify(&face.embedding, taken)
    }

    /// Matches a raw embedding against the known persons.
    ///
    /// Candidates are visited in descending similarity. The first one at or
    /// above the threshold that passes the birth-date constraint wins.
    #[must_use]
    pub fn identify(&self, embedding: &[f32], taken: Option<NaiveDateTime>) -> Identification {
        if embedding.is_empty() || self.index.is_empty() {
            return Identification::not_identified();
        }

        let query = l2_normalize(embedding);
        for candidate in self.index.search(&query, self.config.max_candidates) {
            if candidate.similarity < self.config.threshold {
                break;
            }
            let Some(person) = self.persons.get(&candidate.person_id) else {
                trace!(person_id = candidate.person_id, "Candidate has no person record");
                continue;
            };
            if self.born_after(person, taken) {
                trace!(
                    person_id = person.id,
                    similarity = candidate.similarity,
                    "Candidate rejected: photo predates birth"
                );
                continue;
            }
            return Identification::identified(person.id, candidate.similarity);
        }

        Identification::not_identified()
    }

    fn born_after(&self, person: &Person, taken: Option<NaiveDateTime>) -> bool {
        let (Some(dob), Some(taken)) = (person.date_of_birth, taken) else {
            return false;
        };
        taken > self.config.anchor_date.and_time(NaiveTime::MIN) && taken < dob.and_time(NaiveTime::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FaceBox, IdentityStatus};
    use pretty_assertions::assert_eq;

    fn person(id: i64, dob: Option<(i32, u32, u32)>) -> Person {
        Person {
            id,
            name: format!("person-{id}"),
            date_of_birth: dob.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        }
    }

    fn embedding(person_id: i64, v: &[f32]) -> PersonEmbedding {
        PersonEmbedding {
            person_id,
            embedding: v.to_vec(),
        }
    }

    fn taken(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).map(|date| date.and_time(NaiveTime::MIN))
    }

    #[test]
    fn test_identical_embedding_is_identified() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(1, None)],
            vec![embedding(1, &[0.3, 0.4, 0.5])],
        );

        let result = identifier.identify(&[0.3, 0.4, 0.5], None);
        assert_eq!(result.status, IdentityStatus::Identified);
        assert_eq!(result.person_id, Some(1));
        assert!((result.confidence - 1.0).abs() < 1e-5);

        let strict = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default().with_threshold(1.0 - 1e-6),
            vec![person(1, None)],
            vec![embedding(1, &[0.3, 0.4, 0.5])],
        );
        assert_eq!(strict.identify(&[0.6, 0.8, 1.0], None).person_id, Some(1));
    }

    #[test]
    fn test_all_below_threshold_not_identified() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(1, None), person(2, None)],
            vec![embedding(1, &[1.0, 0.0]), embedding(2, &[0.0, 1.0])],
        );

        let result = identifier.identify(&[-1.0, -1.0], None);
        assert_eq!(result, Identification::not_identified());
    }

    #[test]
    fn test_person_born_after_photo_is_skipped() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(1, Some((2010, 5, 1))), person(2, Some((1980, 1, 1)))],
            vec![embedding(1, &[1.0, 0.0]), embedding(2, &[0.9, 0.3])],
        );

        let result = identifier.identify(&[1.0, 0.0], taken(2005, 6, 1));
        assert_eq!(result.person_id, Some(2));

        let later = identifier.identify(&[1.0, 0.0], taken(2015, 6, 1));
        assert_eq!(later.person_id, Some(1));
    }

    #[test]
    fn test_birth_constraint_ignored_before_anchor() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(1, Some((2010, 5, 1)))],
            vec![embedding(1, &[1.0, 0.0])],
        );

        assert_eq!(identifier.identify(&[1.0, 0.0], taken(1985, 1, 1)).person_id, Some(1));
        assert_eq!(identifier.identify(&[1.0, 0.0], None).person_id, Some(1));
    }

    #[test]
    fn test_anchor_date_is_configurable() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default()
                .with_anchor_date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            vec![person(1, Some((2010, 5, 1)))],
            vec![embedding(1, &[1.0, 0.0])],
        );

        let result = identifier.identify(&[1.0, 0.0], taken(1985, 1, 1));
        assert_eq!(result.status, IdentityStatus::NotIdentified);
    }

    #[test]
    fn test_small_face_not_identified() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(1, None)],
            vec![embedding(1, &[1.0, 0.0])],
        );
        let mut face = DetectedFace {
            bounding_box: FaceBox {
                left: 0,
                top: 0,
                width: 20,
                height: 20,
            },
            embedding: vec![1.0, 0.0],
            ..DetectedFace::default()
        };

        assert_eq!(identifier.identify_face(&face, 1.0, None).person_id, None);
        assert_eq!(identifier.identify_face(&face, 0.5, None).person_id, Some(1));

        face.bounding_box.width = 40;
        face.bounding_box.height = 40;
        assert_eq!(identifier.identify_face(&face, 1.0, None).person_id, Some(1));
    }

    #[test]
    fn test_unknown_person_candidate_is_skipped() {
        let identifier = FaceIdentifier::from_directory(
            FaceIdentificationConfig::default(),
            vec![person(2, None)],
            vec![embedding(1, &[1.0, 0.0]), embedding(2, &[0.9, 0.2])],
        );

        assert_eq!(identifier.identify(&[1.0, 0.0], None).person_id, Some(2));
    }
}

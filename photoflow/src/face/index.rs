//! Nearest-person search over reference embeddings.

use super::embedding::{dot, l2_normalize};
use crate::model::PersonEmbedding;
use std::collections::HashMap;

/// A person scored against a query embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub person_id: i64,
    pub similarity: f32,
}

/// Similarity search over person embeddings.
///
/// Implementations return at most `k` candidates, one per person, ordered by
/// descending similarity. The query is already L2-normalized.
pub trait EmbeddingIndex: Send + Sync {
    fn search(&self, query: &[f32], k: usize) -> Vec<Candidate>;

    /// Number of stored embeddings.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact brute-force index.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entries: Vec<(i64, Vec<f32>)>,
}

impl FlatIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from stored person embeddings.
    #[must_use]
    pub fn from_embeddings(embeddings: impl IntoIterator<Item = PersonEmbedding>) -> Self {
        let mut index = Self::new();
        for e in embeddings {
            index.insert(e.person_id, &e.embedding);
        }
        index
    }

    /// Adds one reference embedding for `person_id`. Empty vectors are ignored.
    pub fn insert(&mut self, person_id: i64, embedding: &[f32]) {
        if embedding.is_empty() {
            return;
        }
        self.entries.push((person_id, l2_normalize(embedding)));
    }
}

impl EmbeddingIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<Candidate> {
        let mut best: HashMap<i64, f32> = HashMap::new();
        for (person_id, stored) in &self.entries {
            if stored.len() != query.len() {
                continue;
            }
            let score = dot(query, stored);
            best.entry(*person_id)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }

        let mut candidates: Vec<Candidate> = best
            .into_iter()
            .map(|(person_id, similarity)| Candidate {
                person_id,
                similarity,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.person_id.cmp(&b.person_id))
        });
        candidates.truncate(k);
        candidates
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

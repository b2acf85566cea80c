//! Face-to-person identification by embedding similarity.
//!
//! A detected face's embedding is L2-normalized and compared against the
//! stored reference embeddings of known persons. The best candidate above the
//! similarity threshold wins, unless the photo predates the person's birth.

mod embedding;
mod identify;
mod index;

pub use embedding::{cosine_similarity, l2_normalize};
pub use identify::{FaceIdentificationConfig, FaceIdentifier};
pub use index::{Candidate, EmbeddingIndex, FlatIndex};

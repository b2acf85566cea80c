//! Vector helpers for face embeddings.

/// Smallest norm used as a divisor; protects against zero vectors.
const MIN_NORM: f32 = 1e-12;

/// Returns `v / max(||v||, 1e-12)`.
#[must_use]
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(MIN_NORM);
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity of two vectors.
///
/// Returns 0 when the lengths differ or either vector is empty or zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Dot product of two vectors already known to be unit length.
#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

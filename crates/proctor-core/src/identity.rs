//! Identity verification by cosine similarity against an enrolled reference.

use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::types::Embedding;

/// Cosine similarity in [-1, 1].
///
/// `None` for empty, unequal-length or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    (denom > 0.0).then(|| dot / denom)
}

/// Compares observed embeddings against a session reference. Never errors; any
/// incomparable pair is a non-match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityVerifier {
    pub threshold: f32,
}

impl Default for IdentityVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl IdentityVerifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Similarity of two embeddings, or `None` when they are not comparable
    /// (missing, empty, different length, or produced by different model revisions).
    pub fn similarity(&self, observed: Option<&Embedding>, reference: Option<&Embedding>) -> Option<f32> {
        let (observed, reference) = (observed?, reference?);
        if let (Some(a), Some(b)) = (&observed.model_version, &reference.model_version) {
            if a != b {
                tracing::debug!(observed = %a, reference = %b, "embedding model revision mismatch");
                return None;
            }
        }
        cosine_similarity(&observed.values, &reference.values)
    }

    pub fn is_match(&self, observed: Option<&Embedding>, reference: Option<&Embedding>) -> bool {
        self.similarity(observed, reference)
            .is_some_and(|sim| sim >= self.threshold)
    }
}

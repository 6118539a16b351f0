//! Boundary traits for the external scoring models.

use crate::core::score::ScoreTriple;
use crate::Result;

/// A semantic-similarity model that scores candidates against references.
///
/// `candidates` and `references` are parallel lists; implementations return
/// exactly one triple per pair, in input order. Calls may be slow and are
/// expected to be deterministic for identical input.
pub trait SimilarityScorer {
    fn score(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<ScoreTriple>>;
}

impl<T: SimilarityScorer + ?Sized> SimilarityScorer for &T {
    fn score(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<ScoreTriple>> {
        (**self).score(candidates, references)
    }
}

/// A cross-encoder that scores (query, passage) pairs jointly.
pub trait PairScorer {
    fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

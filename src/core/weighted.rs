//! Positional weighting of segment scores.

use anyhow::ensure;
use tracing::debug;

use crate::core::error::EvalError;
use crate::core::score::ScoreTriple;
use crate::core::scorer::SimilarityScorer;
use crate::core::segment::{split_segments, MAX_SEGMENTS};

/// Immutable positional weights; weight `i` applies to segment `i`.
///
/// The number of weights is also the maximum number of segments that are
/// scored. Weights need not sum to one since aggregation renormalises over the
/// segments actually present.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentWeights {
    weights: Vec<f64>,
}

impl SegmentWeights {
    /// Weights used for four-line answers: the second line carries the answer body.
    pub const DEFAULT: [f64; MAX_SEGMENTS] = [0.1333, 0.6, 0.1333, 0.1333];

    pub fn new(weights: Vec<f64>) -> crate::Result<Self> {
        ensure!(!weights.is_empty(), "At least one segment weight is required");
        for (i, w) in weights.iter().enumerate() {
            ensure!(
                w.is_finite() && *w >= 0.0,
                "Segment weight {} must be a non-negative number, got {}",
                i + 1,
                w
            );
        }
        Ok(Self { weights })
    }

    /// Weight of segment `position`, zero past the end of the vector.
    pub fn weight(&self, position: usize) -> f64 {
        self.weights.get(position).copied().unwrap_or(0.0)
    }

    /// Maximum number of segments these weights cover.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }
}

impl Default for SegmentWeights {
    fn default() -> Self {
        Self {
            weights: Self::DEFAULT.to_vec(),
        }
    }
}

/// Weighted average of score triples, normalised by the total weight used.
///
/// Returns [`EvalError::DivisionUndefined`] when the weights sum to zero,
/// including when `scores` is empty.
pub fn weighted_average<I>(scores: I) -> Result<ScoreTriple, EvalError>
where
    I: IntoIterator<Item = (ScoreTriple, f64)>,
{
    let (total, total_weight) = scores.into_iter().fold(
        (ScoreTriple::default(), 0.0),
        |(total, total_weight), (triple, weight)| {
            (total.plus(triple.scaled(weight)), total_weight + weight)
        },
    );

    if total_weight <= 0.0 {
        return Err(EvalError::DivisionUndefined);
    }
    Ok(total.divided(total_weight))
}

/// Scores a multi-line prediction segment by segment and combines the
/// segment scores with positional weights.
pub struct SegmentedScorer<S> {
    scorer: S,
    weights: SegmentWeights,
}

impl<S: SimilarityScorer> SegmentedScorer<S> {
    pub fn new(scorer: S, weights: SegmentWeights) -> Self {
        Self { scorer, weights }
    }

    pub fn weights(&self) -> &SegmentWeights {
        &self.weights
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Aggregate score of `prediction` against `reference`.
    ///
    /// Segments with zero weight are not sent to the model. All remaining
    /// segments go to the model in one batch.
    pub fn score_item(&self, prediction: &str, reference: &str) -> Result<ScoreTriple, EvalError> {
        let (segments, weights): (Vec<&str>, Vec<f64>) =
            split_segments(prediction, self.weights.len())
                .enumerate()
                .map(|(i, segment)| (segment, self.weights.weight(i)))
                .filter(|(_, weight)| *weight > 0.0)
                .unzip();

        if segments.is_empty() {
            return Err(EvalError::DivisionUndefined);
        }
        debug!(segments = segments.len(), "scoring prediction segments");

        let references = vec![reference; segments.len()];
        let triples = score_checked(&self.scorer, &segments, &references)?;

        weighted_average(triples.into_iter().zip(weights))
    }
}

/// Calls `scorer` and validates that it returned one finite triple per pair.
pub(crate) fn score_checked<S: SimilarityScorer + ?Sized>(
    scorer: &S,
    candidates: &[&str],
    references: &[&str],
) -> Result<Vec<ScoreTriple>, EvalError> {
    let triples = scorer
        .score(candidates, references)
        .map_err(|e| EvalError::ScorerFailure(format!("{e:#}")))?;

    if triples.len() != candidates.len() {
        return Err(EvalError::ScorerFailure(format!(
            "expected {} scores, model returned {}",
            candidates.len(),
            triples.len()
        )));
    }
    if let Some(bad) = triples.iter().find(|t| !t.is_finite()) {
        return Err(EvalError::ScorerFailure(format!(
            "model returned a non-finite score {bad:?}"
        )));
    }
    Ok(triples)
}

//! Score triples and greedy cosine-matching similarity.

use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Precision, recall and F1 for one candidate/reference pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreTriple {
    /// How well candidate tokens are covered by the reference
    pub precision: f64,
    /// How well reference tokens are covered by the candidate
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1: f64,
}

impl ScoreTriple {
    pub fn new(precision: f64, recall: f64, f1: f64) -> Self {
        Self {
            precision,
            recall,
            f1,
        }
    }

    /// Builds a triple whose F1 is the harmonic mean of `precision` and `recall`.
    pub fn from_precision_recall(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self::new(precision, recall, f1)
    }

    /// Multiplies every component by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(
            self.precision * factor,
            self.recall * factor,
            self.f1 * factor,
        )
    }

    /// Divides every component by `divisor`.
    pub fn divided(self, divisor: f64) -> Self {
        Self::new(
            self.precision / divisor,
            self.recall / divisor,
            self.f1 / divisor,
        )
    }

    /// Component-wise sum.
    pub fn plus(self, other: Self) -> Self {
        Self::new(
            self.precision + other.precision,
            self.recall + other.recall,
            self.f1 + other.f1,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.precision.is_finite() && self.recall.is_finite() && self.f1.is_finite()
    }
}

/// Greedy-matching similarity between two token embedding sequences.
///
/// Every candidate token is matched to its most similar reference token
/// (precision) and every reference token to its most similar candidate token
/// (recall). Tokens whose mask entry is zero take no part in matching or
/// averaging.
///
/// # Arguments
/// * `candidate_embeddings` - (cand_len × hidden) token embeddings
/// * `reference_embeddings` - (ref_len × hidden) token embeddings
/// * `candidate_mask` - 1.0 for scored candidate tokens, 0.0 otherwise
/// * `reference_mask` - 1.0 for scored reference tokens, 0.0 otherwise
pub fn greedy_match_score(
    candidate_embeddings: &Tensor,
    reference_embeddings: &Tensor,
    candidate_mask: &Tensor,
    reference_mask: &Tensor,
) -> ScoreTriple {
    let cand = unit_rows(candidate_embeddings);
    let refs = unit_rows(reference_embeddings);
    let similarity = cand.matmul(&refs.transpose(0, 1));

    // Pairs involving a masked token can never be the best match.
    let pair_mask = (candidate_mask.unsqueeze(1) * reference_mask.unsqueeze(0)).gt(0.5);
    let similarity = similarity.where_self(
        &pair_mask,
        &Tensor::full_like(&similarity, f64::NEG_INFINITY),
    );

    let precision = masked_mean(&similarity.max_dim(1, false).0, candidate_mask);
    let recall = masked_mean(&similarity.max_dim(0, false).0, reference_mask);

    ScoreTriple::from_precision_recall(precision, recall)
}

/// L2-normalises each row, leaving all-zero rows at zero.
fn unit_rows(embeddings: &Tensor) -> Tensor {
    let norms = embeddings
        .norm_scalaropt_dim(2.0, [1], true)
        .clamp_min(1e-12);
    embeddings / norms
}

/// Mean of `values` over positions where `mask` is set; 0.0 when nothing is set.
fn masked_mean(values: &Tensor, mask: &Tensor) -> f64 {
    let keep = mask.gt(0.5);
    let count = keep.to_kind(Kind::Float).sum(Kind::Float).double_value(&[]);
    if count == 0.0 {
        return 0.0;
    }
    let kept = values.where_self(&keep, &Tensor::zeros_like(values));
    kept.sum(Kind::Float).double_value(&[]) / count
}

/// Scoring mask that drops special tokens and anything past `length`.
pub fn create_scoring_mask(token_ids: &[i64], special_token_ids: &[i64], length: usize) -> Tensor {
    let mask: Vec<f32> = token_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            if i >= length || special_token_ids.contains(id) {
                0.0
            } else {
                1.0
            }
        })
        .collect();
    Tensor::from_slice(&mask)
}

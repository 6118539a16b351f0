//! Dataset loading and per-item evaluation.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::Local;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::error::EvalError;
use crate::core::report::{EvaluationReport, ItemResult, ItemStatus};
use crate::core::score::ScoreTriple;
use crate::core::scorer::SimilarityScorer;
use crate::core::weighted::{score_checked, SegmentWeights, SegmentedScorer};
use crate::Result;

/// One evaluation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub question: String,
    #[serde(rename = "groundTruth")]
    pub ground_truth: String,
    pub prediction: String,
    /// Any other fields of the input record, echoed into the JSON report
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How a prediction is compared to its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Newline segments scored separately and combined with positional weights
    Weighted,
    /// Entire prediction scored in one piece
    Whole,
}

/// What to do when the model fails on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run with the item's error.
    Abort,
    /// Record the item as failed and carry on.
    Skip,
}

#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    pub mode: ScoringMode,
    pub weights: SegmentWeights,
    pub on_scorer_error: FailurePolicy,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Weighted,
            weights: SegmentWeights::default(),
            on_scorer_error: FailurePolicy::Abort,
        }
    }
}

/// Reads a dataset file: a JSON array of items.
///
/// Every failure is reported as [`EvalError::InputMalformed`], before any
/// scoring takes place.
pub fn load_dataset(path: &Path) -> std::result::Result<Vec<Item>, EvalError> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::malformed(path, e))?;
    parse_dataset(&content).map_err(|e| EvalError::malformed(path, e))
}

/// Parses dataset JSON text.
pub fn parse_dataset(content: &str) -> serde_json::Result<Vec<Item>> {
    serde_json::from_str(content)
}

/// Runs a scorer over a whole dataset and builds the report.
pub struct DatasetEvaluator<S> {
    segmented: SegmentedScorer<S>,
    options: EvaluationOptions,
}

impl<S: SimilarityScorer> DatasetEvaluator<S> {
    pub fn new(scorer: S, options: EvaluationOptions) -> Self {
        Self {
            segmented: SegmentedScorer::new(scorer, options.weights.clone()),
            options,
        }
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn scorer(&self) -> &S {
        self.segmented.scorer()
    }

    /// Scores a single item according to the configured mode.
    pub fn score_item(&self, item: &Item) -> std::result::Result<ScoreTriple, EvalError> {
        match self.options.mode {
            ScoringMode::Weighted => self
                .segmented
                .score_item(&item.prediction, &item.ground_truth),
            ScoringMode::Whole => {
                let triples = score_checked(
                    self.segmented.scorer(),
                    &[item.prediction.as_str()],
                    &[item.ground_truth.as_str()],
                )?;
                triples
                    .into_iter()
                    .next()
                    .ok_or_else(|| EvalError::ScorerFailure("model returned no score".into()))
            }
        }
    }

    /// Scores many items in whole mode with one scorer call.
    ///
    /// If the batched call fails, items are rescored one by one so the
    /// failure is attributed to the items that cause it.
    fn score_whole_batch(&self, items: &[Item]) -> Vec<std::result::Result<ScoreTriple, EvalError>> {
        if items.is_empty() {
            return Vec::new();
        }
        let predictions: Vec<&str> = items.iter().map(|i| i.prediction.as_str()).collect();
        let references: Vec<&str> = items.iter().map(|i| i.ground_truth.as_str()).collect();

        match score_checked(self.segmented.scorer(), &predictions, &references) {
            Ok(triples) => triples.into_iter().map(Ok).collect(),
            Err(e) => {
                debug!(error = %e, "batched scoring failed, retrying items individually");
                items.iter().map(|item| self.score_item(item)).collect()
            }
        }
    }

    /// Scores items in dataset order. Weighted mode scores one item per
    /// scorer call; whole mode sends the whole dataset in one call.
    pub fn evaluate(&self, items: Vec<Item>) -> Result<EvaluationReport> {
        info!(items = items.len(), mode = ?self.options.mode, "evaluating dataset");
        let outcomes = match self.options.mode {
            ScoringMode::Weighted => {
                let mut outcomes = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let outcome = self.score_item(item);
                    self.check_outcome(idx, &outcome)?;
                    outcomes.push(outcome);
                }
                outcomes
            }
            ScoringMode::Whole => {
                let outcomes = self.score_whole_batch(&items);
                for (idx, outcome) in outcomes.iter().enumerate() {
                    self.check_outcome(idx, outcome)?;
                }
                outcomes
            }
        };
        self.build_report(items, outcomes)
    }

    /// Turns a scorer failure into a run-ending error when the policy says so.
    fn check_outcome(
        &self,
        idx: usize,
        outcome: &std::result::Result<ScoreTriple, EvalError>,
    ) -> Result<()> {
        if let Err(EvalError::ScorerFailure(msg)) = outcome {
            if self.options.on_scorer_error == FailurePolicy::Abort {
                return Err(EvalError::ScorerFailure(msg.clone()))
                    .with_context(|| format!("Scoring question {}", idx + 1));
            }
        }
        Ok(())
    }

    fn build_report(
        &self,
        items: Vec<Item>,
        outcomes: Vec<std::result::Result<ScoreTriple, EvalError>>,
    ) -> Result<EvaluationReport> {
        let mut results = Vec::with_capacity(items.len());

        for (idx, (item, outcome)) in items.into_iter().zip(outcomes).enumerate() {
            let question_id = idx + 1;
            let (scores, status, error) = match outcome {
                Ok(triple) => (Some(triple), ItemStatus::Scored, None),
                Err(EvalError::DivisionUndefined) => {
                    warn!(question_id, "prediction has no weighted segments, leaving it unscored");
                    (None, ItemStatus::Undefined, Some(EvalError::DivisionUndefined.to_string()))
                }
                Err(EvalError::ScorerFailure(msg)) => {
                    warn!(question_id, error = %msg, "scorer failed, skipping item");
                    (None, ItemStatus::Failed, Some(msg))
                }
                Err(other) => return Err(other.into()),
            };
            results.push(ItemResult {
                question_id,
                item,
                scores,
                status,
                error,
            });
        }

        let weights = match self.options.mode {
            ScoringMode::Weighted => Some(self.options.weights.as_slice().to_vec()),
            ScoringMode::Whole => None,
        };
        let report = EvaluationReport::new(Local::now(), self.options.mode, weights, results);
        info!(
            scored = report.metadata.scored_questions,
            total = report.metadata.total_questions,
            "evaluation finished"
        );
        Ok(report)
    }
}

impl<S: SimilarityScorer + Sync> DatasetEvaluator<S> {
    /// Scores items on the rayon pool. Report order matches dataset order.
    pub fn evaluate_parallel(&self, items: Vec<Item>) -> Result<EvaluationReport> {
        info!(items = items.len(), mode = ?self.options.mode, "evaluating dataset in parallel");
        let outcomes: Vec<_> = match self.options.mode {
            ScoringMode::Weighted => items.par_iter().map(|item| self.score_item(item)).collect(),
            ScoringMode::Whole => {
                let chunk = items.len().div_ceil(rayon::current_num_threads()).max(1);
                items
                    .par_chunks(chunk)
                    .flat_map_iter(|chunk| self.score_whole_batch(chunk))
                    .collect()
            }
        };
        for (idx, outcome) in outcomes.iter().enumerate() {
            self.check_outcome(idx, outcome)?;
        }
        self.build_report(items, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_keeps_extra_fields() {
        let items = parse_dataset(
            r#"[{"question": "q", "groundTruth": "g", "prediction": "p", "category": "faq"}]"#,
        )
        .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ground_truth, "g");
        assert_eq!(items[0].extra["category"], "faq");
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"question": "q", "prediction": "p"}}]"#).unwrap();

        let err = load_dataset(file.path()).unwrap_err();

        match err {
            EvalError::InputMalformed { reason, .. } => assert!(reason.contains("groundTruth")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_malformed() {
        let err = load_dataset(Path::new("/nonexistent/dataset.json")).unwrap_err();
        assert!(matches!(err, EvalError::InputMalformed { .. }));
    }

    #[test]
    fn test_not_an_array_is_malformed() {
        assert!(parse_dataset(r#"{"question": "q"}"#).is_err());
        assert!(parse_dataset("not json").is_err());
    }
}

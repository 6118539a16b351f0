//! Error taxonomy for dataset evaluation.

use std::path::PathBuf;

/// Failures an evaluation run can surface.
///
/// `InputMalformed` aborts a run before any scoring happens.
/// `DivisionUndefined` and `ScorerFailure` are raised per item; the dataset
/// aggregator decides whether they end the run or are recorded on the item.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The input file is missing, is not valid JSON, or lacks a required field.
    #[error("malformed input {}: {reason}", path.display())]
    InputMalformed { path: PathBuf, reason: String },

    /// No segment of the prediction carried a non-zero weight.
    #[error("total segment weight is zero, aggregate is undefined")]
    DivisionUndefined,

    /// The similarity model raised an error or returned unusable output.
    #[error("scorer failed: {0}")]
    ScorerFailure(String),
}

impl EvalError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EvalError::InputMalformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

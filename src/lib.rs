//! Offline evaluation of generated answers with BERTScore and cross-encoders.

pub mod cli;
pub mod core;

// Re-export main types
pub use core::{
    BERTScorer, BERTScorerBuilder, BERTScorerConfig, DatasetEvaluator, EvalError,
    EvaluationOptions, EvaluationReport, ScoreTriple, SegmentWeights, SegmentedScorer,
    SimilarityScorer,
};

/// Convenient alias for a result with a boxed error.
pub type Result<T> = anyhow::Result<T>;

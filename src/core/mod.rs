mod coherence;
mod cross_encoder;
mod dataset;
mod error;
mod model;
mod pipeline;
mod report;
mod score;
mod scorer;
mod segment;
mod tokenizer;
mod weighted;
pub mod api;

pub use api::{fetch_model_files, ModelFiles};

pub use coherence::{
    contextual_inputs, extract_turns, load_chat_log, score_session, session_messages,
    ChatMessage, CoherenceReport, CreatedAt, MessageType, Turn, TurnScore, CONTEXT_SEPARATOR,
};
pub use cross_encoder::{CrossEncoderConfig, CrossEncoderScorer};
pub use dataset::{
    load_dataset, parse_dataset, DatasetEvaluator, EvaluationOptions, FailurePolicy, Item,
    ScoringMode,
};
pub use error::EvalError;
pub use model::{default_layer, resolve_layer};
pub use pipeline::{BERTScorer, BERTScorerBuilder, BERTScorerConfig};
pub use report::{
    format_score, mean_scores, EvaluationReport, ItemResult, ItemStatus, ReportMetadata,
    ReportPaths, CSV_HEADER,
};
pub use score::{create_scoring_mask, greedy_match_score, ScoreTriple};
pub use scorer::{PairScorer, SimilarityScorer};
pub use segment::{split_segments, MAX_SEGMENTS};
pub use tokenizer::{vocab_file_size, EncodingResult, Tokenizer, TokenizerArgs};
pub use weighted::{weighted_average, SegmentWeights, SegmentedScorer};

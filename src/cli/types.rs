//! Command-line interface for rust-bert-eval.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_bert::pipelines::common::ModelType;

use crate::core::{fetch_model_files, FailurePolicy, ModelFiles, ScoringMode, SegmentWeights};
use crate::Result;

#[derive(Parser)]
#[command(name = "bert-eval", version, about = "Score generated answers against references")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliEncoderModel {
    Bert,
    Distilbert,
    Roberta,
    Deberta,
}

impl From<CliEncoderModel> for ModelType {
    fn from(model: CliEncoderModel) -> Self {
        match model {
            CliEncoderModel::Bert => ModelType::Bert,
            CliEncoderModel::Distilbert => ModelType::DistilBert,
            CliEncoderModel::Roberta => ModelType::Roberta,
            CliEncoderModel::Deberta => ModelType::Deberta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliScoringMode {
    /// Score each answer line separately and combine with positional weights
    Weighted,
    /// Score the whole answer at once
    Whole,
}

impl From<CliScoringMode> for ScoringMode {
    fn from(mode: CliScoringMode) -> Self {
        match mode {
            CliScoringMode::Weighted => ScoringMode::Weighted,
            CliScoringMode::Whole => ScoringMode::Whole,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliFailurePolicy {
    /// Stop at the first item the model fails on
    Abort,
    /// Mark the item as failed and continue
    Skip,
}

impl From<CliFailurePolicy> for FailurePolicy {
    fn from(policy: CliFailurePolicy) -> Self {
        match policy {
            CliFailurePolicy::Abort => FailurePolicy::Abort,
            CliFailurePolicy::Skip => FailurePolicy::Skip,
        }
    }
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false, args = ["pretrained", "model_dir"])]
pub struct ModelSource {
    /// HF hub name of the encoder (e.g., "bert-base-multilingual-cased"); the
    /// repo must provide rust_model.ot weights
    #[arg(long)]
    pub pretrained: Option<String>,

    /// Directory with config.json, rust_model.ot, vocab.txt or vocab.json, and
    /// merges.txt for BPE models
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}

impl ModelSource {
    /// Name used to pick the default layer: the hub name or the directory name.
    pub fn name(&self) -> String {
        match (&self.pretrained, &self.model_dir) {
            (Some(name), _) => name.clone(),
            (None, Some(dir)) => dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            (None, None) => String::new(),
        }
    }

    /// Local model files, downloading them first for `--pretrained`.
    pub fn resolve(&self) -> Result<ModelFiles> {
        if let Some(pretrained) = &self.pretrained {
            fetch_model_files(pretrained)
        } else if let Some(dir) = &self.model_dir {
            ModelFiles::from_dir(dir)
        } else {
            Err(anyhow::anyhow!(
                "Either a pretrained model name or a model directory must be specified"
            ))
        }
    }
}

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// JSON array of {question, groundTruth, prediction} records
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for the JSON and CSV reports
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value = "weighted")]
    pub mode: CliScoringMode,

    /// Positional segment weights, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = SegmentWeights::DEFAULT)]
    pub weights: Vec<f64>,

    #[arg(long, value_enum, default_value = "abort")]
    pub on_scorer_error: CliFailurePolicy,

    #[clap(flatten)]
    pub model: ModelSource,

    #[arg(long, default_value = "roberta")]
    pub model_type: CliEncoderModel,

    /// Lowercase input before tokenizing (for uncased vocabularies)
    #[arg(long)]
    pub lower_case: bool,

    /// Hidden layer to take embeddings from; negative counts from the last.
    /// Defaults to the calibrated layer of known models, else the last layer
    #[arg(long, allow_negative_numbers = true)]
    pub layer: Option<i32>,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
}

#[derive(Debug, Args)]
pub struct CoherenceArgs {
    /// JSON array of chat messages
    #[arg(short, long)]
    pub chatlog: PathBuf,

    /// Session to score
    #[arg(short, long)]
    pub session: String,

    /// Number of previous questions prepended as context
    #[arg(short, long, default_value_t = 2)]
    pub window: usize,

    /// Directory with config.json, rust_model.ot and vocab.txt
    #[arg(short, long)]
    pub model_dir: PathBuf,

    /// Write the per-turn scores as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReportCsvArgs {
    /// JSON report written by `evaluate`
    #[arg(short, long)]
    pub report: PathBuf,

    /// CSV destination; defaults to the report path with a .csv extension
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Score a dataset of predictions against ground truth
    Evaluate(EvaluateArgs),

    /// Score contextual coherence of a chat session with a cross-encoder
    Coherence(CoherenceArgs),

    /// Regenerate the CSV view of an existing JSON report
    ReportCsv(ReportCsvArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_defaults() {
        let cli = Cli::try_parse_from([
            "bert-eval",
            "evaluate",
            "--input",
            "data.json",
            "--model-dir",
            "models/indobert",
        ])
        .unwrap();

        let Command::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.weights, SegmentWeights::DEFAULT.to_vec());
        assert_eq!(args.mode, CliScoringMode::Weighted);
        assert_eq!(args.on_scorer_error, CliFailurePolicy::Abort);
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert!(args.layer.is_none());
        assert_eq!(args.model.name(), "indobert");
    }

    #[test]
    fn test_custom_weights_and_layer() {
        let cli = Cli::try_parse_from([
            "bert-eval",
            "evaluate",
            "-i",
            "data.json",
            "--pretrained",
            "bert-base-multilingual-cased",
            "--weights",
            "0.5,0.5",
            "--layer",
            "-2",
            "--mode",
            "whole",
            "--on-scorer-error",
            "skip",
        ])
        .unwrap();

        let Command::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.weights, vec![0.5, 0.5]);
        assert_eq!(args.layer, Some(-2));
        assert_eq!(ScoringMode::from(args.mode), ScoringMode::Whole);
        assert_eq!(FailurePolicy::from(args.on_scorer_error), FailurePolicy::Skip);
    }

    #[test]
    fn test_model_source_required() {
        assert!(Cli::try_parse_from(["bert-eval", "evaluate", "-i", "data.json"]).is_err());
        assert!(Cli::try_parse_from([
            "bert-eval",
            "evaluate",
            "-i",
            "data.json",
            "--pretrained",
            "roberta-large",
            "--model-dir",
            "models/roberta",
        ])
        .is_err());
    }

    #[test]
    fn test_local_model_dir_resolves_without_download() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["config.json", "rust_model.ot", "vocab.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let source = ModelSource {
            pretrained: None,
            model_dir: Some(dir.path().to_path_buf()),
        };

        let files = source.resolve().unwrap();

        assert_eq!(files.vocab, dir.path().join("vocab.txt"));
        assert_eq!(files.config, dir.path().join("config.json"));
        assert!(files.merges.is_none());
    }
}

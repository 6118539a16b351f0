//! Cross-encoder relevance model (BERT encoder + single-logit head).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Context};
use rust_bert::bert::{BertConfig, BertEmbeddings, BertModel};
use rust_bert::pipelines::common::ModelType;
use rust_bert::Config;
use tch::{nn, nn::Module, nn::VarStore, no_grad, Device, Kind, Tensor};
use tracing::{debug, info};

use crate::core::scorer::PairScorer;
use crate::core::tokenizer::{Tokenizer, TokenizerArgs};
use crate::Result;

#[derive(Debug, Clone)]
pub struct CrossEncoderConfig {
    /// Directory holding `config.json`, `rust_model.ot` and `vocab.txt`
    pub model_dir: PathBuf,
    pub lower_case: bool,
    pub device: Device,
    pub max_length: usize,
    pub batch_size: usize,
}

impl CrossEncoderConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            lower_case: true,
            device: Device::Cpu,
            max_length: 512,
            batch_size: 32,
        }
    }
}

/// Scores (query, passage) pairs with a sequence-classification checkpoint
/// such as `cross-encoder/ms-marco-MiniLM-L-6-v2` converted to `.ot` weights.
///
/// Scores are the sigmoid of the single relevance logit, so they fall in (0, 1).
pub struct CrossEncoderScorer {
    _vs: VarStore,
    bert: BertModel<BertEmbeddings>,
    classifier: nn::Linear,
    tokenizer: Tokenizer,
    config: CrossEncoderConfig,
}

fn model_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    ensure!(
        path.is_file(),
        "Cross-encoder file {} not found",
        path.display()
    );
    Ok(path)
}

impl CrossEncoderScorer {
    pub fn new(config: CrossEncoderConfig) -> Result<Self> {
        ensure!(config.batch_size > 0, "Batch size must be positive");
        let config_path = model_file(&config.model_dir, "config.json")?;
        let weights_path = model_file(&config.model_dir, "rust_model.ot")?;
        let vocab_path = model_file(&config.model_dir, "vocab.txt")?;

        info!(model_dir = %config.model_dir.display(), "loading cross-encoder");
        let bert_config = BertConfig::from_file(&config_path);
        let mut var_store = VarStore::new(config.device);
        let root = var_store.root();
        let bert = BertModel::<BertEmbeddings>::new(&root / "bert", &bert_config);
        let classifier = nn::linear(
            &root / "classifier",
            bert_config.hidden_size,
            1,
            Default::default(),
        );
        var_store
            .load(&weights_path)
            .with_context(|| format!("Loading weights from {}", weights_path.display()))?;

        let tokenizer = Tokenizer::new(TokenizerArgs::for_model(
            ModelType::Bert,
            vocab_path,
            None,
            config.lower_case,
            config.max_length,
        ))?;

        Ok(Self {
            _vs: var_store,
            bert,
            classifier,
            tokenizer,
            config,
        })
    }

    fn score_batch(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let encoding = self.tokenizer.encode_pairs(pairs, self.config.device);

        let logits = no_grad(|| -> Result<Tensor> {
            let output = self.bert.forward_t(
                Some(&encoding.input_ids),
                Some(&encoding.attention_mask),
                Some(&encoding.token_type_ids),
                None,
                None,
                None,
                None,
                false,
            )?;
            let pooled = output
                .pooled_output
                .ok_or_else(|| anyhow!("Cross-encoder returned no pooled output"))?;
            Ok(self.classifier.forward(&pooled))
        })?;

        let scores = logits
            .squeeze_dim(-1)
            .sigmoid()
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        Ok(Vec::<f32>::try_from(&scores)?)
    }
}

impl PairScorer for CrossEncoderScorer {
    fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.config.batch_size) {
            debug!(pairs = chunk.len(), "scoring cross-encoder batch");
            scores.extend(self.score_batch(chunk)?);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = CrossEncoderScorer::new(CrossEncoderConfig::new(dir.path())).err().unwrap();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_config_defaults() {
        let config = CrossEncoderConfig::new("models/ms-marco");
        assert!(config.lower_case);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.device, Device::Cpu);
    }
}

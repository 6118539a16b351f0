//! BERTScore backend assembling tokenizer, encoder and greedy matching.

use std::collections::HashSet;

use anyhow::ensure;
use rust_bert::pipelines::common::ModelType;
use tch::{Device, Kind};
use tracing::{debug, info};

use crate::core::api::ModelFiles;
use crate::core::model::{default_layer, resolve_layer, Model};
use crate::core::score::{create_scoring_mask, greedy_match_score, ScoreTriple};
use crate::core::scorer::SimilarityScorer;
use crate::core::tokenizer::{vocab_file_size, Tokenizer, TokenizerArgs};
use crate::Result;

/// Configuration for BERTScorer.
#[derive(Debug, Clone)]
pub struct BERTScorerConfig {
    /// Model type (e.g., BERT, RoBERTa, DeBERTa)
    pub model_type: ModelType,
    /// Hub name of the checkpoint; picks the default layer and names it in logs
    pub model_name: String,
    /// Config, weights and tokenizer files of the checkpoint
    pub files: ModelFiles,
    /// Whether to lowercase input text
    pub lower_case: bool,
    /// Device to run on (CPU or CUDA)
    pub device: Device,
    /// Which hidden layer to take embeddings from (negative counts from the end).
    /// `None` uses the calibrated layer for known models, else the last layer.
    pub num_layers: Option<i32>,
    /// Maximum sequence length
    pub max_length: usize,
    /// Pairs per forward pass
    pub batch_size: usize,
}

impl Default for BERTScorerConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::Roberta,
            model_name: "roberta-large".into(),
            files: ModelFiles::default(),
            lower_case: false,
            device: Device::Cpu,
            num_layers: None,
            max_length: 512,
            batch_size: 64,
        }
    }
}

/// Pretrained-encoder implementation of [`SimilarityScorer`].
pub struct BERTScorer {
    tokenizer: Tokenizer,
    model: Model,
    config: BERTScorerConfig,
    special_token_ids: Vec<i64>,
}

impl BERTScorer {
    pub fn config(&self) -> &BERTScorerConfig {
        &self.config
    }

    /// Loads the tokenizer and encoder described by `config`.
    ///
    /// Fails when the vocabulary has more entries than the encoder's
    /// embedding matrix, which means the files belong to different models.
    pub fn new(mut config: BERTScorerConfig) -> Result<Self> {
        ensure!(config.batch_size > 0, "Batch size must be positive");
        if config.num_layers.is_none() {
            config.num_layers = default_layer(&config.model_name);
        }

        let tokenizer = Tokenizer::new(TokenizerArgs::for_model(
            config.model_type,
            config.files.vocab.clone(),
            config.files.merges.clone(),
            config.lower_case,
            config.max_length,
        ))?;

        info!(
            model = %config.model_name,
            model_type = ?config.model_type,
            layer = ?config.num_layers,
            "loading encoder"
        );
        let model = Model::new(
            config.model_type,
            &config.files.config,
            &config.files.weights,
            config.device,
        )?;

        let vocab_entries = vocab_file_size(&config.files.vocab)?;
        ensure!(
            vocab_entries as i64 <= model.vocab_size(),
            "Vocabulary {} has {} entries but {} embeds only {}",
            config.files.vocab.display(),
            vocab_entries,
            config.model_name,
            model.vocab_size()
        );

        let special: HashSet<i64> = tokenizer.special_token_ids();

        Ok(Self {
            tokenizer,
            model,
            config,
            special_token_ids: special.into_iter().collect(),
        })
    }

    fn score_batch(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<ScoreTriple>> {
        let device = self.config.device;
        let cand_encoding = self.tokenizer.encode(candidates, device);
        let ref_encoding = self.tokenizer.encode(references, device);

        let cand_states = self.model.forward(
            &cand_encoding.input_ids,
            &cand_encoding.attention_mask,
            Some(&cand_encoding.token_type_ids),
        )?;
        let ref_states = self.model.forward(
            &ref_encoding.input_ids,
            &ref_encoding.attention_mask,
            Some(&ref_encoding.token_type_ids),
        )?;

        let layer = resolve_layer(self.config.num_layers, cand_states.len())?;
        let cand_embeddings = &cand_states[layer];
        let ref_embeddings = &ref_states[layer];

        let mut results = Vec::with_capacity(candidates.len());
        for i in 0..candidates.len() {
            let cand_len = cand_encoding.lengths[i];
            let ref_len = ref_encoding.lengths[i];

            let cand_mask = create_scoring_mask(
                &cand_encoding.token_ids[i],
                &self.special_token_ids,
                cand_len,
            )
            .to_device(device);
            let ref_mask =
                create_scoring_mask(&ref_encoding.token_ids[i], &self.special_token_ids, ref_len)
                    .to_device(device);

            let cand_has_tokens = cand_mask.sum(Kind::Float).double_value(&[]) > 0.0;
            let ref_has_tokens = ref_mask.sum(Kind::Float).double_value(&[]) > 0.0;

            // Inputs with no content tokens score zero
            let triple = if cand_has_tokens && ref_has_tokens {
                let cand_emb = cand_embeddings.get(i as i64).slice(0, 0, cand_len as i64, 1);
                let ref_emb = ref_embeddings.get(i as i64).slice(0, 0, ref_len as i64, 1);
                greedy_match_score(&cand_emb, &ref_emb, &cand_mask, &ref_mask)
            } else {
                ScoreTriple::default()
            };
            results.push(triple);
        }

        Ok(results)
    }
}

impl SimilarityScorer for BERTScorer {
    fn score(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<ScoreTriple>> {
        ensure!(
            candidates.len() == references.len(),
            "Number of candidates ({}) must equal number of references ({})",
            candidates.len(),
            references.len()
        );

        let mut all_results = Vec::with_capacity(candidates.len());
        for (cands, refs) in candidates
            .chunks(self.config.batch_size)
            .zip(references.chunks(self.config.batch_size))
        {
            debug!(pairs = cands.len(), "scoring batch");
            all_results.extend(self.score_batch(cands, refs)?);
        }
        Ok(all_results)
    }
}

/// Builder for creating BERTScorer with custom configuration.
pub struct BERTScorerBuilder {
    pub config: BERTScorerConfig,
}

impl BERTScorerBuilder {
    pub fn new() -> Self {
        Self {
            config: BERTScorerConfig::default(),
        }
    }

    /// Sets the model type and name.
    pub fn model(mut self, model_type: ModelType, model_name: &str) -> Self {
        self.config.model_type = model_type;
        self.config.model_name = model_name.to_string();
        self
    }

    pub fn model_files(mut self, files: ModelFiles) -> Self {
        self.config.files = files;
        self
    }

    pub fn lower_case(mut self, lower_case: bool) -> Self {
        self.config.lower_case = lower_case;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Sets the layer to extract embeddings from.
    pub fn num_layers(mut self, layers: i32) -> Self {
        self.config.num_layers = Some(layers);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length = max_length;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn build(self) -> Result<BERTScorer> {
        BERTScorer::new(self.config)
    }
}

impl Default for BERTScorerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Pretrained encoder loading and hidden-state extraction.

use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context};
use rust_bert::bert::{BertConfig, BertEmbeddings, BertModel};
use rust_bert::deberta::{DebertaConfig, DebertaForMaskedLM};
use rust_bert::distilbert::{DistilBertConfig, DistilBertModel};
use rust_bert::pipelines::common::ModelType;
use rust_bert::roberta::{RobertaConfig, RobertaForMaskedLM};
use rust_bert::Config;
use tch::{nn::VarStore, no_grad, Device, Tensor};

use crate::Result;

/// Encoders the BERTScore backend can run.
enum EncoderModel {
    Bert(BertModel<BertEmbeddings>),
    DistilBert(DistilBertModel),
    Roberta(RobertaForMaskedLM),
    Deberta(DebertaForMaskedLM),
}

/// Encoder together with the variable store holding its weights.
pub struct Model {
    _vs: VarStore,
    encoder: EncoderModel,
    device: Device,
    vocab_size: i64,
}

fn ensure_supported(model_type: ModelType) -> Result<()> {
    match model_type {
        ModelType::Bert
        | ModelType::DistilBert
        | ModelType::Roberta
        | ModelType::XLMRoberta
        | ModelType::Deberta => Ok(()),
        other => bail!("Model type {:?} not supported", other),
    }
}

/// Layer BERTScore uses for well-known checkpoints, counting the embeddings
/// output as layer 0.
pub fn default_layer(model_name: &str) -> Option<i32> {
    let layer = match model_name {
        "bert-base-uncased" | "bert-base-cased" => 9,
        "bert-large-uncased" | "bert-large-cased" => 18,
        "bert-base-multilingual-cased" | "bert-base-multilingual-uncased" => 9,
        "distilbert-base-uncased" | "distilbert-base-multilingual-cased" => 5,
        "roberta-base" => 10,
        "roberta-large" => 17,
        "xlm-roberta-base" => 9,
        "xlm-roberta-large" => 17,
        "microsoft/deberta-base" => 9,
        "microsoft/deberta-large" => 16,
        _ => return None,
    };
    Some(layer)
}

impl Model {
    /// Builds an encoder that exposes every hidden layer from a config file
    /// and `rust_model.ot` weights.
    ///
    /// BERT and DistilBERT encoders live under the `bert` and `distilbert`
    /// prefixes of the checkpoint, as in hub exports of the pretraining heads.
    pub fn new(
        model_type: ModelType,
        config_path: &Path,
        weights_path: &Path,
        device: Device,
    ) -> Result<Self> {
        ensure_supported(model_type)?;

        let mut var_store = VarStore::new(device);
        let root = var_store.root();
        let (encoder, vocab_size) = match model_type {
            ModelType::Bert => {
                let mut config = BertConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                let model = BertModel::<BertEmbeddings>::new(&root / "bert", &config);
                (EncoderModel::Bert(model), config.vocab_size)
            }
            ModelType::DistilBert => {
                let mut config = DistilBertConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                let model = DistilBertModel::new(&root / "distilbert", &config);
                (EncoderModel::DistilBert(model), config.vocab_size)
            }
            ModelType::Roberta | ModelType::XLMRoberta => {
                let mut config = RobertaConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                let model = RobertaForMaskedLM::new(&root, &config);
                (EncoderModel::Roberta(model), config.vocab_size)
            }
            ModelType::Deberta => {
                let mut config = DebertaConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                let model = DebertaForMaskedLM::new(&root, &config);
                (EncoderModel::Deberta(model), config.vocab_size)
            }
            other => bail!("Model type {:?} not supported", other),
        };
        var_store
            .load(weights_path)
            .with_context(|| format!("Loading weights from {}", weights_path.display()))?;

        Ok(Model {
            _vs: var_store,
            encoder,
            device,
            vocab_size,
        })
    }

    /// Rows of the input embedding matrix.
    pub fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    /// Forward pass returning the hidden states of every layer, embeddings first.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: Option<&Tensor>,
    ) -> Result<Vec<Tensor>> {
        let max_id = input_ids.max().int64_value(&[]);
        ensure!(
            max_id < self.vocab_size,
            "Token id {} is outside the model vocabulary of {} entries; tokenizer and weights do not match",
            max_id,
            self.vocab_size
        );

        let input_ids = input_ids.to_device(self.device);
        let attention_mask = attention_mask.to_device(self.device);
        let token_type_ids = token_type_ids.map(|t| t.to_device(self.device));

        no_grad(|| match &self.encoder {
            EncoderModel::Bert(model) => {
                model.forward_hidden_states(input_ids, attention_mask, token_type_ids)
            }
            EncoderModel::DistilBert(model) => {
                model.forward_hidden_states(input_ids, attention_mask, token_type_ids)
            }
            EncoderModel::Roberta(model) => {
                model.forward_hidden_states(input_ids, attention_mask, token_type_ids)
            }
            EncoderModel::Deberta(model) => {
                model.forward_hidden_states(input_ids, attention_mask, token_type_ids)
            }
        })
    }
}

/// Resolves a layer request against `num_layers` hidden states.
///
/// Non-negative values index from the embeddings layer, negative values count
/// back from the last layer, `None` selects the last layer.
pub fn resolve_layer(requested: Option<i32>, num_layers: usize) -> Result<usize> {
    if num_layers == 0 {
        bail!("Encoder produced no hidden states");
    }
    let idx = match requested {
        None => num_layers as i64 - 1,
        Some(n) if n >= 0 => n as i64,
        Some(n) => num_layers as i64 + n as i64,
    };
    if idx < 0 || idx >= num_layers as i64 {
        bail!(
            "Requested layer {} but model only has {} layers",
            requested.unwrap_or(-1),
            num_layers
        );
    }
    Ok(idx as usize)
}

trait ForwardHiddenStates {
    fn forward_hidden_states(
        &self,
        input_ids: Tensor,
        attention_mask: Tensor,
        token_type_ids: Option<Tensor>,
    ) -> Result<Vec<Tensor>>;
}

fn hidden_states_or_err(states: Option<Vec<Tensor>>) -> Result<Vec<Tensor>> {
    states.ok_or_else(|| anyhow!("Encoder did not return hidden states"))
}

impl ForwardHiddenStates for BertModel<BertEmbeddings> {
    fn forward_hidden_states(
        &self,
        input_ids: Tensor,
        attention_mask: Tensor,
        token_type_ids: Option<Tensor>,
    ) -> Result<Vec<Tensor>> {
        let output = self.forward_t(
            Some(&input_ids),
            Some(&attention_mask),
            token_type_ids.as_ref(),
            None,
            None,
            None,
            None,
            false,
        )?;
        hidden_states_or_err(output.all_hidden_states)
    }
}

impl ForwardHiddenStates for DistilBertModel {
    fn forward_hidden_states(
        &self,
        input_ids: Tensor,
        attention_mask: Tensor,
        _token_type_ids: Option<Tensor>,
    ) -> Result<Vec<Tensor>> {
        let output = self.forward_t(Some(&input_ids), Some(&attention_mask), None, false)?;
        hidden_states_or_err(output.all_hidden_states)
    }
}

impl ForwardHiddenStates for RobertaForMaskedLM {
    fn forward_hidden_states(
        &self,
        input_ids: Tensor,
        attention_mask: Tensor,
        _token_type_ids: Option<Tensor>,
    ) -> Result<Vec<Tensor>> {
        let output = self.forward_t(
            Some(&input_ids),
            Some(&attention_mask),
            None,
            None,
            None,
            None,
            None,
            false,
        );
        hidden_states_or_err(output.all_hidden_states)
    }
}

impl ForwardHiddenStates for DebertaForMaskedLM {
    fn forward_hidden_states(
        &self,
        input_ids: Tensor,
        attention_mask: Tensor,
        token_type_ids: Option<Tensor>,
    ) -> Result<Vec<Tensor>> {
        let output = self.forward_t(
            Some(&input_ids),
            Some(&attention_mask),
            token_type_ids.as_ref(),
            None,
            None,
            false,
        )?;
        hidden_states_or_err(output.all_hidden_states)
    }
}

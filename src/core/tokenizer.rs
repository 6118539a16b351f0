//! Tokenization and batching for the encoder models.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use rust_bert::pipelines::common::{ModelType, TokenizerOption};
use rust_tokenizers::tokenizer::TruncationStrategy;
use rust_tokenizers::TokenizedInput;
use tch::{Device, Tensor};

use crate::Result;

/// Wrapper for a BERT-family tokenizer, handling special tokens and batching.
pub struct Tokenizer {
    tokenizer: TokenizerOption,
    max_len: usize,
    truncation_strategy: TruncationStrategy,
    stride: usize,
}

/// Batched tokenization outputs, including padded tensors and raw token ID lists.
pub struct EncodingResult {
    /// Batched input IDs tensor of shape (batch_size, seq_len).
    pub input_ids: Tensor,
    /// Batched attention mask tensor of shape (batch_size, seq_len).
    pub attention_mask: Tensor,
    /// Batched token type IDs tensor of shape (batch_size, seq_len).
    pub token_type_ids: Tensor,
    /// Raw token IDs per sequence (unpadded), including special tokens.
    pub token_ids: Vec<Vec<i64>>,
    /// True length of each sequence (number of tokens before padding).
    pub lengths: Vec<usize>,
}

pub struct TokenizerArgs {
    pub model: ModelType,
    pub vocab_path: PathBuf,
    pub merges_path: Option<PathBuf>,
    pub lower_case: bool,
    pub strip_accents: Option<bool>,
    pub add_prefix_space: Option<bool>,
    pub max_len: usize,
    pub truncation_strategy: TruncationStrategy,
    pub stride: usize,
}

impl TokenizerArgs {
    /// Arguments for single-sentence encoding with the usual per-model defaults.
    pub fn for_model(
        model: ModelType,
        vocab_path: PathBuf,
        merges_path: Option<PathBuf>,
        lower_case: bool,
        max_len: usize,
    ) -> Self {
        Self {
            model,
            vocab_path,
            merges_path,
            lower_case,
            strip_accents: None,
            add_prefix_space: match model {
                ModelType::Roberta | ModelType::GPT2 => Some(true),
                _ => None,
            },
            max_len,
            truncation_strategy: TruncationStrategy::LongestFirst,
            stride: 0,
        }
    }
}

/// Number of entries in a `vocab.txt` (one token per line) or `vocab.json`
/// (token to id map) vocabulary.
pub fn vocab_file_size(path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Reading vocabulary {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        let vocab: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("Parsing vocabulary {}", path.display()))?;
        Ok(vocab.len())
    } else {
        Ok(content.lines().count())
    }
}

/// Pads `vec` to `target_len` with `pad_value`; longer vectors are untouched.
#[inline(always)]
fn padded<T: Clone>(vec: &[T], pad_value: T, target_len: usize) -> Vec<T> {
    let mut out = vec.to_owned();
    if out.len() < target_len {
        out.resize(target_len, pad_value);
    }
    out
}

/// Stacks equal-length rows into a (rows × len) tensor on `device`.
#[inline(always)]
fn to_batched_tensor<T: Copy + tch::kind::Element>(rows: &[Vec<T>], device: Device) -> Tensor {
    Tensor::stack(
        &rows.iter().map(|v| Tensor::from_slice(v)).collect::<Vec<_>>(),
        0,
    )
    .to_device(device)
}

impl Tokenizer {
    /// Creates a tokenizer from local vocabulary (and merges) files.
    pub fn new(args: TokenizerArgs) -> Result<Self> {
        let vocab = args.vocab_path;
        let tokenizer = TokenizerOption::from_file(
            args.model,
            vocab.to_str().ok_or(Error::msg("Invalid vocab path"))?,
            args.merges_path
                .as_ref()
                .map(|p| p.to_str().ok_or(Error::msg("Invalid merges path")))
                .transpose()?,
            args.lower_case,
            args.strip_accents,
            args.add_prefix_space,
        )?;
        Ok(Tokenizer {
            tokenizer,
            max_len: args.max_len,
            truncation_strategy: args.truncation_strategy,
            stride: args.stride,
        })
    }

    /// IDs of the tokens that carry no content (BOS/CLS, SEP, PAD).
    pub fn special_token_ids(&self) -> HashSet<i64> {
        [
            self.tokenizer.get_bos_id(),
            self.tokenizer.get_sep_id(),
            self.tokenizer.get_pad_id(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Tokenizes single sentences into a padded batch.
    pub fn encode<S: AsRef<str> + Send + Sync>(&self, texts: &[S], device: Device) -> EncodingResult {
        let inputs =
            self.tokenizer
                .encode_list(texts, self.max_len, &self.truncation_strategy, self.stride);
        self.batch(inputs, device)
    }

    /// Tokenizes (first, second) text pairs into a padded batch with segment IDs.
    pub fn encode_pairs<S: AsRef<str> + Send + Sync>(
        &self,
        pairs: &[(S, S)],
        device: Device,
    ) -> EncodingResult {
        let inputs = self.tokenizer.encode_pair_list(
            pairs,
            self.max_len,
            &self.truncation_strategy,
            self.stride,
        );
        self.batch(inputs, device)
    }

    fn batch(&self, inputs: Vec<TokenizedInput>, device: Device) -> EncodingResult {
        let pad_id = self.tokenizer.get_pad_id().unwrap_or(0);
        let max_len = inputs.iter().map(|i| i.token_ids.len()).max().unwrap_or(0);

        let mut token_ids = Vec::with_capacity(inputs.len());
        let mut lengths = Vec::with_capacity(inputs.len());
        let mut id_rows = Vec::with_capacity(inputs.len());
        let mut mask_rows = Vec::with_capacity(inputs.len());
        let mut type_rows = Vec::with_capacity(inputs.len());

        for input in inputs {
            let seq_len = input.token_ids.len();
            let segments: Vec<i64> = input.segment_ids.iter().map(|&s| s as i64).collect();

            id_rows.push(padded(&input.token_ids, pad_id, max_len));
            mask_rows.push(padded(&vec![1i64; seq_len], 0, max_len));
            type_rows.push(padded(&segments, 0, max_len));
            lengths.push(seq_len);
            token_ids.push(input.token_ids);
        }

        EncodingResult {
            input_ids: to_batched_tensor(&id_rows, device),
            attention_mask: to_batched_tensor(&mask_rows, device),
            token_type_ids: to_batched_tensor(&type_rows, device),
            token_ids,
            lengths,
        }
    }
}

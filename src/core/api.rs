//! Locating encoder checkpoints on the Hugging Face Hub or on disk.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use hf_hub::api::sync::Api;
use tracing::info;

use crate::Result;

/// Config, weights and tokenizer files of one encoder checkpoint.
///
/// Weights are the libtorch `rust_model.ot` format that rust-bert loads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    /// `vocab.txt` (WordPiece) or `vocab.json` (BPE)
    pub vocab: PathBuf,
    /// BPE merges, absent for WordPiece vocabularies
    pub merges: Option<PathBuf>,
}

impl ModelFiles {
    /// Files of a checkpoint stored in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let existing = |name: &str| {
            let path = dir.join(name);
            path.is_file().then_some(path)
        };
        let required = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            ensure!(path.is_file(), "Model file {} not found", path.display());
            Ok(path)
        };

        let vocab = existing("vocab.txt")
            .or_else(|| existing("vocab.json"))
            .with_context(|| format!("No vocab.txt or vocab.json in {}", dir.display()))?;

        Ok(Self {
            config: required("config.json")?,
            weights: required("rust_model.ot")?,
            vocab,
            merges: existing("merges.txt"),
        })
    }
}

/// Fetches the config, `rust_model.ot` weights and tokenizer files of
/// `model_name` from one hub repository. Files are cached by `hf-hub`.
pub fn fetch_model_files(model_name: &str) -> Result<ModelFiles> {
    let api = Api::new()?;
    let repo = api.model(model_name.to_string());

    let config = repo
        .get("config.json")
        .with_context(|| format!("Fetching config.json for {model_name}"))?;
    let weights = repo
        .get("rust_model.ot")
        .with_context(|| format!("Fetching rust_model.ot for {model_name}"))?;
    let vocab = repo
        .get("vocab.txt")
        .or_else(|_| repo.get("vocab.json"))
        .with_context(|| format!("Fetching vocab.txt or vocab.json for {model_name}"))?;
    let merges = repo.get("merges.txt").ok();

    info!(model = model_name, weights = %weights.display(), "resolved model files");
    Ok(ModelFiles {
        config,
        weights,
        vocab,
        merges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_local_bpe_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["config.json", "rust_model.ot", "vocab.json", "merges.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let files = ModelFiles::from_dir(dir.path()).unwrap();

        assert_eq!(files.vocab, dir.path().join("vocab.json"));
        assert_eq!(files.merges, Some(dir.path().join("merges.txt")));
        assert_eq!(files.weights, dir.path().join("rust_model.ot"));
    }

    #[test]
    fn test_local_checkpoint_requires_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "").unwrap();
        fs::write(dir.path().join("vocab.txt"), "").unwrap();

        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("rust_model.ot"));
    }
}

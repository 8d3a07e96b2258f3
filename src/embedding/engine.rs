//! Local embedding engine via Candle
//!
//! Runs paraphrase-multilingual-MiniLM-L12-v2 (Spanish + English support
//! queries land on the same model) with mean pooling and L2
//! normalization, so downstream cosine comparisons can assume unit
//! vectors.

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::errors::{PipelineError, Result};
use crate::index::flat::normalize;

const MODEL_ID: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// Embedding dimensionality shared by ingestion and query time
pub const EMBEDDING_DIM: usize = 384;

/// Maps text to fixed-size dense vectors
///
/// Implementations must be deterministic for identical input: the
/// semantic cache and the retriever both key on the produced vectors.
pub trait Embedder: Send + Sync {
    /// Embed a single text into a unit-length vector
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of produced vectors
    fn dimension(&self) -> usize;
}

/// Sentence-transformer embedder backed by Candle
pub struct SentenceEmbedder {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
}

impl SentenceEmbedder {
    /// Create new embedding engine (downloads model on first use)
    pub fn new() -> Result<Self> {
        Self::load().map_err(|e| PipelineError::Config(format!("embedder init failed: {:#}", e)))
    }

    fn load() -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(MODEL_ID.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };

        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device,
        })
    }

    fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let ids = encoding.get_ids().to_vec();
        let mask = encoding.get_attention_mask().to_vec();
        let len = ids.len();

        let token_ids = Tensor::from_vec(ids, (1, len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (1, len), &self.device)?;
        let token_type_ids = Tensor::zeros((1, len), DType::U32, &self.device)?;

        let embeddings =
            self.model
                .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = Self::mean_pool(&embeddings, &attention_mask)?;
        let mut rows = pooled.to_vec2::<f32>()?;
        let vector = rows
            .pop()
            .ok_or_else(|| anyhow::anyhow!("model returned no embedding row"))?;

        Ok(normalize(&vector))
    }

    /// Mean pooling with attention mask
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        let pooled = sum_embeddings.broadcast_div(&sum_mask)?;

        Ok(pooled)
    }
}

impl Embedder for SentenceEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("embedding failed: {:#}", e)))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

//! Local ONNX Runtime embedding provider.
//!
//! In-process inference with a MiniLM-style sentence encoder: tokenize,
//! run the transformer, mean-pool over the attention mask, L2-normalize.
//! Model files must already exist under the configured cache directory; a
//! missing model is a construction-time error so the vectorizer can fall
//! through to the deterministic embedder instead.

use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Result, StrataError};

/// Sequence cap matching the MiniLM training length.
const MAX_SEQ_LEN: usize = 256;

#[derive(Debug)]
pub struct LocalProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

// Safety: Tokenizer is Send+Sync; Session is only touched under the Mutex.
unsafe impl Send for LocalProvider {}
unsafe impl Sync for LocalProvider {}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = std::path::PathBuf::from(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(StrataError::Embedding(format!(
                "model files not found under {}",
                cache_dir.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| {
                b.with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            })
            .and_then(|b| b.with_intra_threads(2))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| StrataError::Embedding(format!("failed to load ONNX model: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| StrataError::Embedding(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| StrataError::Embedding(format!("failed to set truncation: {e}")))?;

        tracing::info!(model = %model_path.display(), "local embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions: config.dimensions,
        })
    }
}

impl EmbeddingProvider for LocalProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| StrataError::Embedding(format!("tokenization failed: {e}")))?;

        let seq_len = encoding.get_ids().len();
        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids = vec![0i64; seq_len];

        let shape = vec![1i64, seq_len as i64];
        let make_tensor = |data: Vec<i64>| {
            Tensor::from_array((shape.clone(), data.into_boxed_slice()))
                .map_err(|e| StrataError::Embedding(format!("tensor build failed: {e}")))
        };
        let ids_tensor = make_tensor(input_ids)?;
        let mask_tensor = make_tensor(attention_mask.clone())?;
        let type_tensor = make_tensor(token_type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| StrataError::Embedding(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            })
            .map_err(|e| StrataError::Embedding(format!("inference failed: {e}")))?;

        // Output name varies by export; fall back to the first output.
        let hidden = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .unwrap_or_else(|| &outputs[0]);

        let (out_shape, data) = hidden
            .try_extract_tensor::<f32>()
            .map_err(|e| StrataError::Embedding(format!("tensor extract failed: {e}")))?;

        let dims: &[i64] = &out_shape;
        if dims.len() != 3 || dims[2] as usize != self.dimensions {
            return Err(StrataError::Embedding(format!(
                "unexpected output shape {dims:?}, expected [1, seq, {}]",
                self.dimensions
            )));
        }

        Ok(mean_pool(
            data,
            &attention_mask,
            dims[1] as usize,
            self.dimensions,
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Attention-masked mean pooling over token embeddings, then L2 norm.
fn mean_pool(data: &[f32], mask: &[i64], seq_len: usize, hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (s, &m) in mask.iter().take(seq_len).enumerate() {
        if m > 0 {
            let offset = s * hidden;
            for (d, slot) in pooled.iter_mut().enumerate() {
                *slot += data[offset + d];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for slot in &mut pooled {
            *slot /= count;
        }
    }

    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for slot in &mut pooled {
            *slot /= norm;
        }
    }
    pooled
}

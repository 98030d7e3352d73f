// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedding adapter using all-MiniLM-L6-v2.
//!
//! Produces 384-dimensional unit-length embeddings on CPU with zero
//! external API calls. This is the primary embedding backend; the
//! provider's embedding endpoint is only a fallback.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use reverie_core::ReverieError;
use reverie_core::traits::EmbeddingAdapter;
use reverie_core::traits::adapter::PluginAdapter;
use reverie_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

use crate::service::l2_normalize;

/// Embedding dimensions for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

fn embed_err(message: impl Into<String>) -> ReverieError {
    ReverieError::EmbeddingUnavailable {
        message: message.into(),
        source: None,
    }
}

/// ONNX-based embedding adapter.
///
/// Loads the quantized INT8 model and tokenizer from disk. Inference runs
/// on CPU with a single thread.
pub struct LocalEmbedder {
    /// ONNX Runtime session (not Send, wrapped in Mutex for safety).
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Safety: Session is accessed through Mutex which provides synchronization.
// The tokenizer is thread-safe for encoding operations.
unsafe impl Send for LocalEmbedder {}
unsafe impl Sync for LocalEmbedder {}

impl LocalEmbedder {
    /// Creates an embedder from `model.onnx` and `tokenizer.json` on disk.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, ReverieError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            embed_err(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| embed_err(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| embed_err(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| embed_err(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                embed_err(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed a single text, returning a normalized 384-dim vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| embed_err(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> =
            encoding.get_type_ids().iter().map(|&t| t as i64).collect();

        let seq_len = input_ids.len();
        let input_ids_array = to_batch_array(input_ids, seq_len, "input_ids")?;
        let attention_mask_array =
            to_batch_array(attention_mask.clone(), seq_len, "attention_mask")?;
        let token_type_ids_array = to_batch_array(token_type_ids, seq_len, "token_type_ids")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| embed_err(format!("failed to lock ONNX session: {e}")))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array)
            .map_err(|e| embed_err(format!("failed to build input_ids tensor: {e}")))?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask_array)
            .map_err(|e| embed_err(format!("failed to build attention_mask tensor: {e}")))?;
        let token_type_ids_tensor = TensorRef::from_array_view(&token_type_ids_array)
            .map_err(|e| embed_err(format!("failed to build token_type_ids tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| embed_err(format!("ONNX inference failed: {e}")))?;

        // Output shape is [1, seq_len, hidden_size].
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| embed_err(format!("failed to extract output tensor: {e}")))?;

        let hidden_size = shape[shape.len() - 1] as usize;
        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);
        Ok(l2_normalize(&pooled))
    }
}

fn to_batch_array(values: Vec<i64>, seq_len: usize, name: &str) -> Result<Array2<i64>, ReverieError> {
    Array2::from_shape_vec((1, seq_len), values)
        .map_err(|e| embed_err(format!("failed to shape {name} tensor: {e}")))
}

/// Apply attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for i in 0..seq_len {
        if attention_mask[i] > 0 {
            for j in 0..hidden_size {
                sum[j] += embeddings[i * hidden_size + j];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    sum
}

#[async_trait]
impl PluginAdapter for LocalEmbedder {
    fn name(&self) -> &str {
        "local-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        match self.session.lock() {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "session lock poisoned: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for LocalEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        let mut vectors = Vec::with_capacity(input.texts.len());
        for text in &input.texts {
            vectors.push(self.embed_text(text)?);
        }
        Ok(EmbeddingOutput {
            vectors,
            dimensions: EMBEDDING_DIM,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_ignores_padding_tokens() {
        // 2 tokens, hidden_size=3, first token masked out (padding)
        let embeddings = vec![
            9.0, 9.0, 9.0, // token 0 (padding)
            1.0, 2.0, 3.0, // token 1 (real)
        ];
        let attention_mask = vec![0, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 2, 3);
        assert_eq!(result, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_pool_averages_real_tokens() {
        let embeddings = vec![
            1.0, 2.0, // token 0
            3.0, 4.0, // token 1
            5.0, 6.0, // token 2
        ];
        let attention_mask = vec![1, 1, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 3, 2);
        assert!((result[0] - 3.0).abs() < f32::EPSILON);
        assert!((result[1] - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mean_pool_of_fully_masked_input_is_zero() {
        let embeddings = vec![1.0, 2.0, 3.0, 4.0];
        let attention_mask = vec![0, 0];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 2, 2);
        assert_eq!(result, vec![0.0, 0.0]);
    }

    // LocalEmbedder::from_files requires actual model files; the adapter
    // wiring is verified at compile time and in the binary's startup path.
}

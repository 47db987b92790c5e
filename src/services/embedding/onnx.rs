//! Local sentence-transformer model run through ONNX Runtime.
//!
//! Expects a directory holding `model.onnx` (a BERT-style export taking
//! `input_ids`, `attention_mask` and `token_type_ids`) and `tokenizer.json`.
//! Token states are mean-pooled over the attention mask, which is how
//! all-MiniLM-L6-v2 produces its 384-dimensional sentence vectors.
//!
//! Inference runs on tokio's blocking pool. The session is shared behind a
//! mutex, so concurrent batches queue for it rather than run in parallel.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayView2, Axis, Ix2, Ix3};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use super::EmbeddingModel;
use crate::error::{EmbeddingError, ModelError};
use crate::models::EmbeddingConfig;

pub struct OnnxEmbeddingModel {
    inner: Arc<OnnxSession>,
    dimension: usize,
}

struct OnnxSession {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxEmbeddingModel {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(ModelError::NotFound(format!(
                "tokenizer not found: {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let dimension = config.dimension as usize;
        Ok(Self {
            inner: Arc::new(OnnxSession {
                session: Mutex::new(session),
                tokenizer,
                dimension,
            }),
            dimension,
        })
    }
}

impl OnnxSession {
    fn run(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * max_len;
            for (j, ((&id, &m), &t)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[offset + j] = i64::from(id);
                attention_mask[offset + j] = i64::from(m);
                token_type_ids[offset + j] = i64::from(t);
            }
        }

        let masks: Vec<Vec<i64>> = attention_mask
            .chunks(max_len.max(1))
            .map(<[i64]>::to_vec)
            .collect();

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                token_type_ids_tensor
            ])
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        match output.ndim() {
            // Token states: [batch, seq, hidden]
            3 => {
                let hidden = output
                    .view()
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| ModelError::InferenceError(e.to_string()))?;
                (0..batch_size)
                    .map(|i| mean_pool(hidden.index_axis(Axis(0), i), &masks[i], self.dimension))
                    .collect()
            }
            // Already pooled: [batch, hidden]
            2 => {
                let pooled = output
                    .view()
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| ModelError::InferenceError(e.to_string()))?;
                check_hidden_size(pooled.ncols(), self.dimension)?;
                Ok(pooled.outer_iter().map(|row| row.to_vec()).collect())
            }
            _ => Err(ModelError::InferenceError(format!(
                "unexpected output shape: {:?}",
                output.shape()
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingModel for OnnxEmbeddingModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || inner.run(&texts))
            .await
            .map_err(|e| ModelError::InferenceError(format!("inference task failed: {}", e)))??;
        Ok(vectors)
    }
}

fn check_hidden_size(hidden: usize, dimension: usize) -> Result<(), ModelError> {
    if hidden != dimension {
        return Err(ModelError::InferenceError(format!(
            "model produces {}-dimensional vectors, configured dimension is {}",
            hidden, dimension
        )));
    }
    Ok(())
}

/// Averages the token states whose mask bit is set.
fn mean_pool(
    tokens: ArrayView2<'_, f32>,
    mask: &[i64],
    dimension: usize,
) -> Result<Vec<f32>, ModelError> {
    check_hidden_size(tokens.ncols(), dimension)?;

    let mut sum = vec![0.0f32; dimension];
    let mut count = 0.0f32;

    for (state, &m) in tokens.outer_iter().zip(mask) {
        if m == 0 {
            continue;
        }
        count += 1.0;
        for (acc, &x) in sum.iter_mut().zip(state.iter()) {
            *acc += x;
        }
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    Ok(sum)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_pool_ignores_padding() {
        let tokens = array![[1.0f32, 2.0], [3.0, 4.0], [100.0, 100.0]];
        let pooled = mean_pool(tokens.view(), &[1, 1, 0], 2).unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_rejects_hidden_size_mismatch() {
        let tokens = array![[1.0f32, 2.0], [3.0, 4.0]];
        let result = mean_pool(tokens.view(), &[1, 1], 4);
        assert!(matches!(result, Err(ModelError::InferenceError(ref msg)) if msg.contains("2-dimensional")));
        assert!(check_hidden_size(384, 384).is_ok());
        assert!(check_hidden_size(768, 384).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = OnnxEmbeddingModel::load(&EmbeddingConfig::default(), dir.path());
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }
}

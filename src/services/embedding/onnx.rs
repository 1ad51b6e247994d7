//! In-process sentence-transformer inference with ONNX Runtime.

use async_trait::async_trait;
use ndarray::{Ix2, Ix3};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    token_type_ids: bool,
}

/// Embeds text with a local ONNX export of a sentence-transformer.
///
/// Expects `model.onnx` and `tokenizer.json` in the model directory. Token
/// embeddings are mean-pooled over the attention mask and L2-normalised.
#[derive(Clone)]
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    model_id: String,
    batch_size: usize,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.model.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_dir().ok_or_else(|| {
            EmbeddingError::ModelError("could not determine models directory".to_string())
        })?;
        Self::load_from(config, &model_dir)
    }

    pub fn load_from(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelError(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .with_intra_threads(num_cpus())
            .map_err(model_error)?
            .commit_from_file(&model_path)
            .map_err(model_error)?;

        let token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelError(format!("tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelError(format!("tokenizer: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(
            model = %config.model,
            dimension = config.dimension,
            "loaded ONNX embedding model"
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dimension: config.dimension as usize,
                token_type_ids,
            }),
            model_id: config.model.clone(),
            batch_size: config.batch_size.max(1) as usize,
        })
    }
}

impl OnnxModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::ModelError(format!("tokenizer: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * seq_len;
            for (j, ((&id, &mask), &type_id)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[row + j] = i64::from(id);
                attention_mask[row + j] = i64::from(mask);
                type_ids[row + j] = i64::from(type_id);
            }
        }

        let ids_tensor =
            Tensor::from_array(([batch_size, seq_len], input_ids)).map_err(model_error)?;
        let mask_tensor = Tensor::from_array(([batch_size, seq_len], attention_mask.clone()))
            .map_err(model_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))?;

        let outputs = if self.token_type_ids {
            let type_tensor =
                Tensor::from_array(([batch_size, seq_len], type_ids)).map_err(model_error)?;
            session.run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
        } else {
            session.run(ort::inputs![ids_tensor, mask_tensor])
        }
        .map_err(model_error)?;

        let output = outputs[0].try_extract_array::<f32>().map_err(model_error)?;

        let embeddings: Vec<Vec<f32>> = match output.ndim() {
            // Token embeddings: mean-pool over the attention mask
            3 => {
                let hidden = output
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
                self.check_dimension(hidden.shape()[2])?;
                (0..batch_size)
                    .map(|i| {
                        let mut pooled = vec![0f32; self.dimension];
                        let mut count = 0f32;
                        for j in 0..seq_len {
                            if attention_mask[i * seq_len + j] == 0 {
                                continue;
                            }
                            count += 1.0;
                            for (d, value) in pooled.iter_mut().enumerate() {
                                *value += hidden[[i, j, d]];
                            }
                        }
                        if count > 0.0 {
                            pooled.iter_mut().for_each(|v| *v /= count);
                        }
                        normalize(&pooled)
                    })
                    .collect()
            }
            // Already pooled sentence embeddings
            2 => {
                let pooled = output
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
                self.check_dimension(pooled.shape()[1])?;
                pooled.outer_iter().map(|row| normalize(&row.to_vec())).collect()
            }
            _ => {
                return Err(EmbeddingError::ModelError(format!(
                    "unexpected output shape: {:?}",
                    output.shape()
                )));
            }
        };

        Ok(embeddings)
    }

    fn check_dimension(&self, produced: usize) -> Result<(), EmbeddingError> {
        if produced == self.dimension {
            Ok(())
        } else {
            Err(EmbeddingError::ModelError(format!(
                "model produces {produced}-dimensional vectors but embedding.dimension is {}",
                self.dimension
            )))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let model = Arc::clone(&self.model);
            let batch = batch.to_vec();
            let embeddings = tokio::task::spawn_blocking(move || model.embed(&batch))
                .await
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))??;
            all_embeddings.extend(embeddings);
        }
        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }

    fn model(&self) -> &str {
        &self.model_id
    }
}

fn model_error(e: ort::Error) -> EmbeddingError {
    EmbeddingError::ModelError(e.to_string())
}

pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

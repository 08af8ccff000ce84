
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::{EmbeddingVector, normalize};
use crate::IndexError;

const DIMENSION_SAMPLE_TEXT: &str = "dimension sample";

/// Text to vector conversion as seen by the index and retrieval layers.
///
/// Implementations are shared across tasks, so they must be callable concurrently.
pub trait EmbeddingModel: Send + Sync {
    /// Embed every text, preserving order. Output vectors are L2-normalized and
    /// all share one dimension; blank texts map to the zero vector.
    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, IndexError>;

    /// Identifier of the underlying model, used in logs and status output
    fn model_name(&self) -> &str;

    /// Output dimension, once the model has been loaded
    fn dimension(&self) -> Option<usize>;
}

/// A raw embedding provider such as an Ollama server
pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Make sure the model can serve requests
    fn load(&self) -> anyhow::Result<()>;

    /// Raw (not necessarily normalized) embeddings, one per input, in order
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadedModel {
    dimension: usize,
}

/// Wraps a backend with lazy, process-wide model loading and output normalization.
///
/// The first `embed` call loads the backend and samples its output dimension; the
/// result is cached for the lifetime of the adapter. A failed load is not cached,
/// so a later call retries.
pub struct ModelAdapter<B> {
    backend: B,
    loaded: OnceLock<LoadedModel>,
}

impl<B: EmbeddingBackend> ModelAdapter<B> {
    #[inline]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: OnceLock::new(),
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load the model now instead of on first use
    #[inline]
    pub fn ensure_loaded(&self) -> Result<usize, IndexError> {
        if let Some(model) = self.loaded.get() {
            return Ok(model.dimension);
        }

        debug!("Loading embedding model {}", self.backend.name());

        self.backend
            .load()
            .map_err(|e| IndexError::ModelUnavailable(format!("{:#}", e)))?;

        let sample = self
            .backend
            .embed_batch(&[DIMENSION_SAMPLE_TEXT.to_string()])
            .map_err(|e| IndexError::ModelUnavailable(format!("{:#}", e)))?;

        let dimension = sample.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(IndexError::ModelUnavailable(format!(
                "Model {} returned an empty embedding",
                self.backend.name()
            )));
        }

        // A concurrent caller may have won the race; both sampled the same model.
        let model = self.loaded.get_or_init(|| LoadedModel { dimension });
        info!(
            "Embedding model {} loaded with dimension {}",
            self.backend.name(),
            model.dimension
        );
        Ok(model.dimension)
    }
}

impl<B: EmbeddingBackend> EmbeddingModel for ModelAdapter<B> {
    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.ensure_loaded()?;

        let (positions, payload): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, text.trim().to_string()))
            .unzip();

        let mut output = vec![vec![0.0_f32; dimension]; texts.len()];
        if payload.is_empty() {
            debug!("All {} texts were blank, returning zero vectors", texts.len());
            return Ok(output);
        }

        let raw = self
            .backend
            .embed_batch(&payload)
            .map_err(|e| IndexError::ModelUnavailable(format!("{:#}", e)))?;

        if raw.len() != payload.len() {
            warn!(
                "Embedding backend returned {} vectors for {} texts",
                raw.len(),
                payload.len()
            );
            return Err(IndexError::ModelUnavailable(format!(
                "Mismatch between request and response counts: {} vs {}",
                payload.len(),
                raw.len()
            )));
        }

        for (position, mut vector) in positions.into_iter().zip(raw) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(IndexError::InvalidVector(
                    "Embedding contains non-finite values".to_string(),
                ));
            }
            normalize(&mut vector);
            output[position] = vector;
        }

        Ok(output)
    }

    fn model_name(&self) -> &str {
        self.backend.name()
    }

    fn dimension(&self) -> Option<usize> {
        self.loaded.get().map(|model| model.dimension)
    }
}

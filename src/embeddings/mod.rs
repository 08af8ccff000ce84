// Embeddings module
// Turns log text into L2-normalized vectors through a lazily loaded model

pub mod model;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{EmbeddingBackend, EmbeddingModel, ModelAdapter};
pub use ollama::OllamaClient;

/// Dense embedding of a single text; unit length unless it is the zero vector
pub type EmbeddingVector = Vec<f32>;

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Inner product of two equally sized vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

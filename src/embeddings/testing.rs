// Deterministic embedding backends for unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{EmbeddingBackend, ModelAdapter};

pub(crate) const TEST_DIMENSION: usize = 64;

/// Bag-of-words backend: each token of three or more characters adds one to a
/// hashed bucket, so texts sharing words have positive similarity.
#[derive(Debug, Default)]
pub(crate) struct HashingBackend {
    pub loads: AtomicUsize,
    pub batches: AtomicUsize,
    pub fail: AtomicBool,
}

impl HashingBackend {
    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; TEST_DIMENSION];
        for token in tokens(text) {
            vector[bucket(&token)] += 1.0;
        }
        vector
    }
}

pub(crate) fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= 3)
        .map(str::to_string)
        .collect()
}

pub(crate) fn bucket(token: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % TEST_DIMENSION as u64) as usize
}

impl EmbeddingBackend for HashingBackend {
    fn name(&self) -> &str {
        "hashing-test"
    }

    fn load(&self) -> anyhow::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("test backend is offline");
        }
        Ok(())
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("test backend is offline");
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }
}

impl EmbeddingBackend for Arc<HashingBackend> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn load(&self) -> anyhow::Result<()> {
        self.as_ref().load()
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.as_ref().embed_batch(texts)
    }
}

/// Adapter over a shared hashing backend, so tests can flip it offline
pub(crate) fn hashing_model() -> (Arc<ModelAdapter<Arc<HashingBackend>>>, Arc<HashingBackend>) {
    let backend = Arc::new(HashingBackend::default());
    let model = Arc::new(ModelAdapter::new(Arc::clone(&backend)));
    (model, backend)
}

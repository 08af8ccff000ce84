// Retrieval module
// Question text in, stored log entries ranked by similarity out

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::database::{LogEntry, LogStore};
use crate::embeddings::EmbeddingModel;
use crate::index::VectorIndexStore;
use crate::{LogRagError, Result};

/// A stored entry with its similarity to the question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub entry: LogEntry,
    pub score: f32,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<VectorIndexStore>,
    log_store: Arc<dyn LogStore>,
    min_score: Option<f32>,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<VectorIndexStore>,
        log_store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            log_store,
            min_score: None,
        }
    }

    /// Drop hits scoring below `min_score`
    #[inline]
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// The `k` stored entries most similar to `question`, best first.
    ///
    /// An empty result means nothing matched. Errors mean retrieval could not
    /// run at all: a blank question, an unavailable model, or a failed lookup.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RankedEntry>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LogRagError::Retrieval("Question must not be empty".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Retrieving top {} entries for question: {}", k, question);

        let embedder = Arc::clone(&self.embedder);
        let texts = vec![question.to_string()];
        let mut vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| LogRagError::Retrieval(format!("Embedding task failed: {}", e)))??;
        let query = vectors.pop().ok_or_else(|| {
            LogRagError::Embedding("Model returned no embedding for the question".to_string())
        })?;

        let hits: Vec<_> = self
            .store
            .search(&query, k)?
            .into_iter()
            .filter(|hit| self.min_score.is_none_or(|min| hit.score >= min))
            .collect();
        if hits.is_empty() {
            debug!("No indexed entries matched");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|hit| hit.log_id.clone()).collect();
        let mut entries: HashMap<String, LogEntry> = self
            .log_store
            .get_entries_by_ids(&ids)
            .await
            .map_err(|e| LogRagError::Database(format!("{:#}", e)))?
            .into_iter()
            .map(|entry| (entry.log_id.clone(), entry))
            .collect();

        let ranked: Vec<RankedEntry> = hits
            .into_iter()
            .filter_map(|hit| match entries.remove(&hit.log_id) {
                Some(entry) => Some(RankedEntry {
                    entry,
                    score: hit.score,
                }),
                None => {
                    debug!("Indexed id {} no longer resolves, skipping", hit.log_id);
                    None
                }
            })
            .collect();

        info!("Retrieved {} entries", ranked.len());
        Ok(ranked)
    }
}

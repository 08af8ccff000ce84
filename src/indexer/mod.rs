// Indexer module
// Turns stored log entries into index vectors; failures never reach the upload caller

pub mod consistency;


use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::IndexError;
use crate::database::{LogEntry, LogEntryId, LogStore};
use crate::embeddings::EmbeddingModel;
use crate::index::{AddReport, FlatIndex, VectorIndexStore};

pub use consistency::{ConsistencyReport, ConsistencyValidator};

/// Text that gets embedded for an entry. Equal severity, source and message
/// always give byte-identical text.
#[inline]
pub fn canonical_text(entry: &LogEntry) -> String {
    format!("[{}] {}: {}", entry.severity, entry.source, entry.message)
}

/// What happened to a batch of freshly stored entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingOutcome {
    /// Every batch reached the index; `persisted` is false if any write to
    /// disk failed
    Indexed { indexed: usize, persisted: bool },
    /// Indexing stopped early; `indexed` entries from earlier batches remain
    Skipped { indexed: usize, reason: String },
}

impl IndexingOutcome {
    #[inline]
    pub fn indexed(&self) -> usize {
        match self {
            Self::Indexed { indexed, .. } | Self::Skipped { indexed, .. } => *indexed,
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Indexed { .. })
    }
}

/// Statistics from a full rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexStats {
    pub entries: usize,
    pub indexed: usize,
}

/// Feeds log entries through the embedding model into the vector index
#[derive(Clone)]
pub struct IngestionIndexer {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<VectorIndexStore>,
    batch_size: usize,
}

impl IngestionIndexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<VectorIndexStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            batch_size: batch_size.max(1),
        }
    }

    #[inline]
    pub fn store(&self) -> &Arc<VectorIndexStore> {
        &self.store
    }

    /// Embed and index entries that were just committed to the database.
    ///
    /// Never fails: problems are logged and described by the outcome, and the
    /// entries stay in the database for a later re-index.
    pub async fn index_entries(&self, entries: &[LogEntry]) -> IndexingOutcome {
        if entries.is_empty() {
            return IndexingOutcome::Indexed {
                indexed: 0,
                persisted: true,
            };
        }

        info!("Indexing {} log entries", entries.len());

        let mut indexed = 0;
        let mut persisted = true;

        for (batch_number, batch) in entries.chunks(self.batch_size).enumerate() {
            match self.index_batch(batch).await {
                Ok(report) => {
                    debug!(
                        "Batch {} added {} vectors (persisted: {})",
                        batch_number + 1,
                        report.added,
                        report.persisted()
                    );
                    indexed += report.added;
                    persisted &= report.persisted();
                }
                Err(e) => {
                    warn!(
                        "Indexing stopped at batch {} after {} entries: {:#}",
                        batch_number + 1,
                        indexed,
                        e
                    );
                    return IndexingOutcome::Skipped {
                        indexed,
                        reason: format!("{:#}", e),
                    };
                }
            }
        }

        if !persisted {
            warn!("Indexed {} entries but the index was not fully persisted", indexed);
        } else {
            info!("Indexed {} log entries", indexed);
        }

        IndexingOutcome::Indexed { indexed, persisted }
    }

    /// Index every entry from files ingested after `since_file`
    pub async fn index_new_entries(
        &self,
        log_store: &dyn LogStore,
        since_file: Option<&str>,
    ) -> IndexingOutcome {
        match log_store.list_new_entries(since_file).await {
            Ok(entries) => self.index_entries(&entries).await,
            Err(e) => {
                warn!("Could not list entries to index: {:#}", e);
                IndexingOutcome::Skipped {
                    indexed: 0,
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    /// Rebuild the index from every stored entry and swap it in.
    ///
    /// Unlike ingestion, failures are returned: the old index stays in place
    /// until the new one is complete. `on_progress` receives
    /// `(embedded, total)` after each batch.
    pub async fn reindex_all<F>(&self, log_store: &dyn LogStore, on_progress: F) -> Result<ReindexStats>
    where
        F: Fn(usize, usize),
    {
        let entries = log_store
            .list_all_entries()
            .await
            .context("Failed to list log entries for re-index")?;
        let total = entries.len();

        info!("Re-indexing {} log entries", total);

        let mut fresh = FlatIndex::new();
        let mut embedded = 0;
        for batch in entries.chunks(self.batch_size) {
            let pairs = self.embed_batch(batch).await?;
            fresh
                .add(pairs)
                .context("Failed to add re-embedded vectors")?;
            embedded += batch.len();
            on_progress(embedded, total);
        }

        let indexed = fresh.len();
        self.store
            .replace(fresh)
            .context("Failed to persist rebuilt index")?;

        info!("Re-index complete: {} vectors", indexed);
        Ok(ReindexStats {
            entries: total,
            indexed,
        })
    }

    async fn index_batch(&self, batch: &[LogEntry]) -> Result<AddReport> {
        let pairs = self.embed_batch(batch).await?;
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || store.add_and_persist(pairs))
            .await
            .context("Index task panicked")?
            .map_err(anyhow::Error::from)
    }

    async fn embed_batch(&self, batch: &[LogEntry]) -> Result<Vec<(LogEntryId, Vec<f32>)>> {
        let ids: Vec<LogEntryId> = batch.iter().map(|e| e.log_id.clone()).collect();
        let texts: Vec<String> = batch.iter().map(canonical_text).collect();
        let embedder = Arc::clone(&self.embedder);

        let vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .context("Embedding task panicked")??;

        if vectors.len() != ids.len() {
            return Err(IndexError::ModelUnavailable(format!(
                "expected {} embeddings, got {}",
                ids.len(),
                vectors.len()
            ))
            .into());
        }

        Ok(ids.into_iter().zip(vectors).collect())
    }
}

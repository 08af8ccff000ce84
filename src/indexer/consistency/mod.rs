// Consistency between the database and the vector index
// Every stored entry should have exactly one vector, and every vector a stored entry


use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{IndexingOutcome, IngestionIndexer};
use crate::database::{LogEntryId, LogStore};

/// Differences between the database and the vector index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of entries in SQLite
    pub database_entries: usize,
    /// Number of vectors in the index
    pub indexed_vectors: usize,
    /// Entry ids stored in SQLite but absent from the index
    pub missing_in_index: Vec<LogEntryId>,
    /// Indexed ids with no SQLite entry
    pub orphaned_in_index: Vec<LogEntryId>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} entries in SQLite, {} vectors in the index",
                self.database_entries, self.indexed_vectors
            )
        } else {
            format!(
                "Index inconsistencies found: {} entries missing from the index, {} orphaned vectors",
                self.missing_in_index.len(),
                self.orphaned_in_index.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len() + self.orphaned_in_index.len()
    }
}

/// Result of [`ConsistencyValidator::reconcile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub removed: usize,
    pub indexing: IndexingOutcome,
}

/// Compares stored entry ids with indexed ids and repairs the index
pub struct ConsistencyValidator<'a> {
    log_store: &'a dyn LogStore,
    indexer: &'a IngestionIndexer,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(log_store: &'a dyn LogStore, indexer: &'a IngestionIndexer) -> Self {
        Self { log_store, indexer }
    }

    #[inline]
    pub async fn validate(&self) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation");

        let entries = self
            .log_store
            .list_all_entries()
            .await
            .context("Failed to list stored log entries")?;
        let indexed = self
            .indexer
            .store()
            .ids()
            .context("Failed to read indexed ids")?;

        debug!(
            "Found {} entries in SQLite and {} vectors in the index",
            entries.len(),
            indexed.len()
        );

        let stored: HashSet<&str> = entries.iter().map(|e| e.log_id.as_str()).collect();
        let indexed_set: HashSet<&str> = indexed.iter().map(String::as_str).collect();

        let mut missing_in_index: Vec<LogEntryId> = entries
            .iter()
            .filter(|e| !indexed_set.contains(e.log_id.as_str()))
            .map(|e| e.log_id.clone())
            .collect();
        missing_in_index.sort();

        let mut orphaned_in_index: Vec<LogEntryId> = indexed
            .iter()
            .filter(|id| !stored.contains(id.as_str()))
            .cloned()
            .collect();
        orphaned_in_index.sort();

        let is_consistent = missing_in_index.is_empty() && orphaned_in_index.is_empty();
        let report = ConsistencyReport {
            database_entries: entries.len(),
            indexed_vectors: indexed.len(),
            missing_in_index,
            orphaned_in_index,
            is_consistent,
        };

        if report.is_consistent {
            info!("Index consistency validation passed");
        } else {
            warn!("{}", report.summary());
        }

        Ok(report)
    }

    /// Drop orphaned vectors, then index the missing entries
    #[inline]
    pub async fn reconcile(&self, report: &ConsistencyReport) -> Result<ReconcileStats> {
        let store = self.indexer.store();

        let removed = if report.orphaned_in_index.is_empty() {
            0
        } else {
            let removed = store
                .remove(&report.orphaned_in_index)
                .context("Failed to remove orphaned vectors")?;
            info!("Removed {} orphaned vectors", removed);
            removed
        };

        let indexing = if report.missing_in_index.is_empty() {
            if removed > 0 {
                store.persist().context("Failed to persist reconciled index")?;
            }
            IndexingOutcome::Indexed {
                indexed: 0,
                persisted: true,
            }
        } else {
            let mut missing = self
                .log_store
                .get_entries_by_ids(&report.missing_in_index)
                .await
                .context("Failed to load entries missing from the index")?;
            missing.sort_by(|a, b| a.log_id.cmp(&b.log_id));
            self.indexer.index_entries(&missing).await
        };

        Ok(ReconcileStats { removed, indexing })
    }
}

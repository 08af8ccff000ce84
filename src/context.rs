// Application context
// One explicit owner for the database, embedder, index store and answer service

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::IndexError;
use crate::config::Config;
use crate::database::{Database, IngestedFile, LogEntry, LogStore, Severity};
use crate::embeddings::{EmbeddingModel, ModelAdapter, OllamaClient};
use crate::generation::AnswerService;
use crate::index::VectorIndexStore;
use crate::indexer::{IndexingOutcome, IngestionIndexer};
use crate::parsers::parse_log_file;
use crate::retrieval::{RankedEntry, Retriever};
use crate::summary::{IncidentSummary, SummaryService};

/// Result of storing and indexing one uploaded file
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub file: IngestedFile,
    pub entries: Vec<LogEntry>,
    pub outcome: IndexingOutcome,
}

impl IngestReport {
    /// Earliest and latest entry timestamps
    #[inline]
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.entries.iter().map(|e| e.timestamp).min()?;
        let last = self.entries.iter().map(|e| e.timestamp).max()?;
        Some((first, last))
    }

    #[inline]
    pub fn severity_breakdown(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.severity).or_insert(0) += 1;
        }
        counts
    }
}

/// Answer to a question plus the best matching entries
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub suggested_followup: String,
    pub matches: Vec<RankedEntry>,
}

pub struct AppContext {
    config: Config,
    database: Arc<Database>,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<VectorIndexStore>,
    indexer: IngestionIndexer,
    retriever: Retriever,
    answers: AnswerService,
    summaries: SummaryService,
}

impl AppContext {
    /// Open the database, load the persisted index and connect the Ollama
    /// embedder and the configured answer generator
    pub async fn initialize(config: Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .context("Failed to initialize SQLite database")?;

        let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(ModelAdapter::new(client));

        let answers =
            AnswerService::from_config(&config.generation, config.retrieval.context_limit)?;
        let summaries = SummaryService::from_config(&config.generation)?;

        let ctx = Self::from_parts(config, Arc::new(database), embedder, answers)?;
        Ok(ctx.with_summaries(summaries))
    }

    /// Assemble a context around an already opened database and embedder.
    ///
    /// Summaries stay deterministic unless `with_summaries` says otherwise.
    #[inline]
    pub fn from_parts(
        config: Config,
        database: Arc<Database>,
        embedder: Arc<dyn EmbeddingModel>,
        answers: AnswerService,
    ) -> Result<Self> {
        let store = Arc::new(VectorIndexStore::from_config(&config));
        match store.initialize() {
            Ok(count) => info!("Vector index ready with {} entries", count),
            Err(IndexError::IndexCorrupt(reason)) => {
                warn!(
                    "Ignoring corrupt vector index ({}); run 'log-rag reindex' to rebuild it",
                    reason
                );
            }
            Err(e) => return Err(e).context("Failed to load vector index"),
        }

        let indexer = IngestionIndexer::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.ingestion.batch_size,
        );
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            Arc::clone(&database) as Arc<dyn LogStore>,
        )
        .with_min_score(config.retrieval.min_score);

        Ok(Self {
            config,
            database,
            embedder,
            store,
            indexer,
            retriever,
            answers,
            summaries: SummaryService::default(),
        })
    }

    #[inline]
    pub fn with_summaries(mut self, summaries: SummaryService) -> Self {
        self.summaries = summaries;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn embedder(&self) -> &dyn EmbeddingModel {
        self.embedder.as_ref()
    }

    #[inline]
    pub fn store(&self) -> &VectorIndexStore {
        &self.store
    }

    #[inline]
    pub fn indexer(&self) -> &IngestionIndexer {
        &self.indexer
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[inline]
    pub fn answers(&self) -> &AnswerService {
        &self.answers
    }

    /// Parse, store and index one uploaded file.
    ///
    /// Parse and database failures are errors. Indexing problems are not: the
    /// entries are stored either way and the outcome says what happened.
    pub async fn ingest(&self, filename: &str, content: &[u8]) -> Result<IngestReport> {
        let parsed = parse_log_file(filename, content)?;

        let (file, entries) = self
            .database
            .ingest_file(filename, &parsed)
            .await
            .with_context(|| format!("Failed to store entries from {}", filename))?;

        info!(
            "Stored {} entries from {} as {}",
            entries.len(),
            filename,
            file.file_id
        );

        let outcome = self.indexer.index_entries(&entries).await;

        Ok(IngestReport {
            file,
            entries,
            outcome,
        })
    }

    /// Retrieve candidates for `question` and answer from them.
    ///
    /// `display_limit` caps the matches returned, not the context given to the
    /// answer generator.
    pub async fn ask(&self, question: &str, display_limit: usize) -> Result<QueryResponse> {
        let candidates = self
            .retriever
            .retrieve(question, self.config.retrieval.search_k)
            .await?;

        let answer = self.answers.answer(question, &candidates).await;

        Ok(QueryResponse {
            answer: answer.answer,
            suggested_followup: answer.suggested_followup,
            matches: candidates.into_iter().take(display_limit).collect(),
        })
    }

    /// Summarize recent incidents across every stored entry, or within one
    /// ingested file
    pub async fn summarize(&self, file_id: Option<&str>) -> Result<IncidentSummary> {
        let entries = match file_id {
            Some(file_id) => {
                let known = self
                    .database
                    .list_files()
                    .await?
                    .iter()
                    .any(|file| file.file_id == file_id);
                if !known {
                    anyhow::bail!("No ingested file with ID {}", file_id);
                }
                self.database.list_entries_for_file(file_id).await?
            }
            None => self.database.list_all_entries().await?,
        };

        Ok(self.summaries.summarize(&entries, Utc::now()).await)
    }

    /// Persist unsaved index changes before the process exits
    #[inline]
    pub fn shutdown(&self) -> Result<()> {
        let written = self
            .store
            .persist_if_dirty()
            .context("Failed to persist vector index on shutdown")?;
        if written {
            info!("Vector index persisted to {}", self.store.index_path().display());
        } else {
            debug!("Vector index unchanged, nothing to persist");
        }
        Ok(())
    }
}

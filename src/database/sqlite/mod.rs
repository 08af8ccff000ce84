use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::LogStore;


pub mod models;
pub mod queries;

pub use models::{IngestedFile, LogEntry, LogEntryId, NewLogEntry, Severity, SeverityCount};
pub use queries::{IngestedFileQueries, LogEntryQueries};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    // Ingestion
    pub async fn ingest_file(
        &self,
        filename: &str,
        entries: &[NewLogEntry],
    ) -> Result<(IngestedFile, Vec<LogEntry>)> {
        LogEntryQueries::ingest_file(&self.pool, filename, entries).await
    }

    // Log entry operations
    pub async fn list_entries_for_file(&self, file_id: &str) -> Result<Vec<LogEntry>> {
        LogEntryQueries::list_by_file(&self.pool, file_id).await
    }

    pub async fn list_entry_ids(&self) -> Result<Vec<String>> {
        LogEntryQueries::list_ids(&self.pool).await
    }

    pub async fn count_entries(&self) -> Result<i64> {
        LogEntryQueries::count(&self.pool).await
    }

    pub async fn severity_breakdown(&self) -> Result<Vec<SeverityCount>> {
        LogEntryQueries::severity_breakdown(&self.pool).await
    }

    pub async fn delete_entry(&self, log_id: &str) -> Result<bool> {
        LogEntryQueries::delete(&self.pool, log_id).await
    }

    // Ingested file operations
    pub async fn list_files(&self) -> Result<Vec<IngestedFile>> {
        IngestedFileQueries::list_all(&self.pool).await
    }

    pub async fn count_files(&self) -> Result<i64> {
        IngestedFileQueries::count(&self.pool).await
    }
}

#[async_trait]
impl LogStore for Database {
    async fn get_entry_by_id(&self, log_id: &str) -> Result<Option<LogEntry>> {
        LogEntryQueries::get_by_id(&self.pool, log_id).await
    }

    async fn get_entries_by_ids(&self, log_ids: &[String]) -> Result<Vec<LogEntry>> {
        LogEntryQueries::get_by_ids(&self.pool, log_ids).await
    }

    async fn list_new_entries(&self, since_file: Option<&str>) -> Result<Vec<LogEntry>> {
        LogEntryQueries::list_new_since(&self.pool, since_file).await
    }

    async fn list_all_entries(&self) -> Result<Vec<LogEntry>> {
        LogEntryQueries::list_all(&self.pool).await
    }
}

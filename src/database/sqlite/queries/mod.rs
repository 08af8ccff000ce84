
use super::models::*;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

const LOG_ENTRY_COLUMNS: &str = "log_id, file_id, timestamp, source, severity, message";

// Keeps `IN (...)` lists well under SQLite's bound-parameter limit
const ID_LOOKUP_CHUNK: usize = 500;

pub struct IngestedFileQueries;

impl IngestedFileQueries {
    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, file_id: &str) -> Result<Option<IngestedFile>> {
        let result = sqlx::query_as::<_, IngestedFile>(
            "SELECT file_id, filename, created_at, entries_parsed FROM ingested_files WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get ingested file by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IngestedFile>> {
        let files = sqlx::query_as::<_, IngestedFile>(
            "SELECT file_id, filename, created_at, entries_parsed FROM ingested_files ORDER BY rowid DESC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list ingested files")?;

        Ok(files)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_files")
            .fetch_one(pool)
            .await
            .context("Failed to count ingested files")?;

        Ok(count)
    }
}

pub struct LogEntryQueries;

impl LogEntryQueries {
    /// Store a file and all of its entries in one transaction.
    ///
    /// Ids continue from the highest existing `log_NNNNNN` number so they stay
    /// sequential and are never reused after deletes.
    #[inline]
    pub async fn ingest_file(
        pool: &SqlitePool,
        filename: &str,
        entries: &[NewLogEntry],
    ) -> Result<(IngestedFile, Vec<LogEntry>)> {
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin ingestion transaction")?;

        let file = IngestedFile {
            file_id: new_file_id(),
            filename: filename.to_string(),
            created_at: now_seconds(),
            entries_parsed: entries.len() as i64,
        };

        sqlx::query(
            "INSERT INTO ingested_files (file_id, filename, created_at, entries_parsed) VALUES (?, ?, ?, ?)",
        )
        .bind(&file.file_id)
        .bind(&file.filename)
        .bind(file.created_at)
        .bind(file.entries_parsed)
        .execute(&mut *tx)
        .await
        .context("Failed to insert ingested file")?;

        let offset: i64 = sqlx::query_scalar("SELECT last_value FROM log_id_sequence WHERE id = 1")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to determine log id offset")?;

        sqlx::query("UPDATE log_id_sequence SET last_value = ? WHERE id = 1")
            .bind(offset + entries.len() as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to advance log id sequence")?;

        let mut stored = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let log_entry = LogEntry {
                log_id: format_log_id(offset + i as i64 + 1),
                file_id: file.file_id.clone(),
                timestamp: entry.timestamp,
                source: entry.source.clone(),
                severity: entry.severity,
                message: entry.message.clone(),
            };

            sqlx::query(
                "INSERT INTO log_entries (log_id, file_id, timestamp, source, severity, message) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&log_entry.log_id)
            .bind(&log_entry.file_id)
            .bind(log_entry.timestamp)
            .bind(&log_entry.source)
            .bind(log_entry.severity)
            .bind(&log_entry.message)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert log entry {}", log_entry.log_id))?;

            stored.push(log_entry);
        }

        tx.commit()
            .await
            .context("Failed to commit ingestion transaction")?;

        debug!(
            "Stored {} log entries for file {} ({})",
            stored.len(),
            file.file_id,
            file.filename
        );

        Ok((file, stored))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, log_id: &str) -> Result<Option<LogEntry>> {
        let result = sqlx::query_as::<_, LogEntry>(&format!(
            "SELECT {LOG_ENTRY_COLUMNS} FROM log_entries WHERE log_id = ?"
        ))
        .bind(log_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get log entry by id")?;

        Ok(result)
    }

    /// Fetch entries for the given ids. Order is unspecified and unknown ids are skipped.
    #[inline]
    pub async fn get_by_ids(pool: &SqlitePool, log_ids: &[String]) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::with_capacity(log_ids.len());

        for chunk in log_ids.chunks(ID_LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "SELECT {LOG_ENTRY_COLUMNS} FROM log_entries WHERE log_id IN ("
            ));
            let mut separated = builder.separated(", ");
            for log_id in chunk {
                separated.push_bind(log_id.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build_query_as::<LogEntry>()
                .fetch_all(pool)
                .await
                .context("Failed to get log entries by ids")?;
            entries.extend(rows);
        }

        Ok(entries)
    }

    #[inline]
    pub async fn list_by_file(pool: &SqlitePool, file_id: &str) -> Result<Vec<LogEntry>> {
        let entries = sqlx::query_as::<_, LogEntry>(&format!(
            "SELECT {LOG_ENTRY_COLUMNS} FROM log_entries WHERE file_id = ? ORDER BY rowid"
        ))
        .bind(file_id)
        .fetch_all(pool)
        .await
        .context("Failed to list log entries for file")?;

        Ok(entries)
    }

    /// Entries belonging to files ingested after `since_file`, or every entry when `None`
    #[inline]
    pub async fn list_new_since(
        pool: &SqlitePool,
        since_file: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let Some(since_file) = since_file else {
            return Self::list_all(pool).await;
        };

        let entries = sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT le.log_id, le.file_id, le.timestamp, le.source, le.severity, le.message
            FROM log_entries le
            JOIN ingested_files f ON f.file_id = le.file_id
            WHERE f.rowid > (SELECT rowid FROM ingested_files WHERE file_id = ?)
            ORDER BY le.rowid
            "#,
        )
        .bind(since_file)
        .fetch_all(pool)
        .await
        .context("Failed to list new log entries")?;

        Ok(entries)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<LogEntry>> {
        let entries = sqlx::query_as::<_, LogEntry>(&format!(
            "SELECT {LOG_ENTRY_COLUMNS} FROM log_entries ORDER BY rowid"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list all log entries")?;

        Ok(entries)
    }

    #[inline]
    pub async fn list_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT log_id FROM log_entries ORDER BY rowid")
            .fetch_all(pool)
            .await
            .context("Failed to list log entry ids")?;

        Ok(ids)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
            .fetch_one(pool)
            .await
            .context("Failed to count log entries")?;

        Ok(count)
    }

    #[inline]
    pub async fn severity_breakdown(pool: &SqlitePool) -> Result<Vec<SeverityCount>> {
        let rows: Vec<(Severity, i64)> = sqlx::query_as(
            "SELECT severity, COUNT(*) FROM log_entries GROUP BY severity ORDER BY COUNT(*) DESC, severity",
        )
        .fetch_all(pool)
        .await
        .context("Failed to compute severity breakdown")?;

        Ok(rows
            .into_iter()
            .map(|(severity, count)| SeverityCount { severity, count })
            .collect())
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, log_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM log_entries WHERE log_id = ?")
            .bind(log_id)
            .execute(pool)
            .await
            .context("Failed to delete log entry")?;

        Ok(result.rows_affected() > 0)
    }
}

fn format_log_id(sequence: i64) -> String {
    format!("log_{:06}", sequence)
}

fn new_file_id() -> String {
    let hex: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("file_{}", hex)
}

fn now_seconds() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

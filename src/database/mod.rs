// Database module
// SQLite holds the log records; the vector index only ever refers to them by id

pub mod sqlite;

pub use sqlite::*;

use anyhow::Result;
use async_trait::async_trait;

/// Read access to stored log entries needed by indexing and retrieval
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn get_entry_by_id(&self, log_id: &str) -> Result<Option<LogEntry>>;

    /// Entries for the given ids; order is unspecified and unknown ids are skipped
    async fn get_entries_by_ids(&self, log_ids: &[String]) -> Result<Vec<LogEntry>>;

    /// Entries from files ingested after `since_file`, or all of them when `None`
    async fn list_new_entries(&self, since_file: Option<&str>) -> Result<Vec<LogEntry>>;

    async fn list_all_entries(&self) -> Result<Vec<LogEntry>>;
}

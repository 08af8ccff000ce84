#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::str::FromStr;

/// Stable public identifier of a log entry, e.g. `log_000123`
pub type LogEntryId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub log_id: LogEntryId,
    pub file_id: String,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 7] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Low,
        Severity::Medium,
        Severity::High,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    /// Relative seriousness, higher is worse. The two label families share
    /// one scale: `HIGH` ranks with `ERROR`, `MEDIUM` with `WARNING`.
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::Error | Severity::High => 3,
            Severity::Warning | Severity::Medium => 2,
            Severity::Info | Severity::Low => 1,
        }
    }

    /// Lenient parse used at ingestion: unknown or blank labels become `Info`
    #[inline]
    pub fn normalize(raw: &str) -> Self {
        raw.parse().unwrap_or(Severity::Info)
    }
}

impl FromStr for Severity {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == upper)
            .ok_or_else(|| format!("Unknown severity: {}", s))
    }
}

impl std::fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed log line that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngestedFile {
    pub file_id: String,
    pub filename: String,
    pub created_at: NaiveDateTime,
    pub entries_parsed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: i64,
}

impl LogEntry {
    /// ISO 8601 timestamp with a trailing `Z`, as shown to users
    #[inline]
    pub fn timestamp_utc(&self) -> String {
        format!("{}Z", self.timestamp.format("%Y-%m-%dT%H:%M:%S"))
    }
}

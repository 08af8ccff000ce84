// Log file parsing
// CSV and loosely delimited TXT logs into entries ready for the database


use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use tracing::{debug, warn};

use crate::database::{NewLogEntry, Severity};
use crate::{LogRagError, Result};

pub const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "source", "severity", "message"];
pub const EXPECTED_HEADER: &str = "timestamp,source,severity,message";
pub const UNKNOWN_SOURCE: &str = "UNKNOWN";

const DELIMITERS: [char; 4] = [',', '\t', '|', ';'];

/// Tried after RFC 3339, for offsets with a space separator or without seconds
const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%Y%m%dT%H%M",
];
/// Date-only timestamps mean midnight UTC
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parse an uploaded log file, dispatching on its extension
#[inline]
pub fn parse_log_file(filename: &str, content: &[u8]) -> Result<Vec<NewLogEntry>> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let entries = match extension.as_deref() {
        Some("csv") => parse_csv(content)?,
        Some("txt") => parse_txt(content, ingestion_time())?,
        _ => {
            return Err(LogRagError::Parse(format!(
                "Unsupported file type for {}: only .csv and .txt are accepted",
                filename
            )));
        }
    };

    debug!("Parsed {} entries from {}", entries.len(), filename);
    Ok(entries)
}

/// Parse CSV content with a required header naming every field, in any order
#[inline]
pub fn parse_csv(content: &[u8]) -> Result<Vec<NewLogEntry>> {
    let text = String::from_utf8_lossy(content);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header_line = lines
        .next()
        .ok_or_else(|| LogRagError::Parse("Empty file".to_string()))?;
    let delimiter = detect_csv_delimiter(header_line);
    let columns = header_columns(&split_fields(header_line, delimiter)).ok_or_else(missing_header)?;
    let width = columns.values().copied().max().unwrap_or(0) + 1;

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        let fields = split_fields(line, delimiter);
        if fields.len() < width {
            skipped += 1;
            continue;
        }
        match build_entry(
            &fields[columns["timestamp"]],
            &fields[columns["source"]],
            &fields[columns["severity"]],
            &fields[columns["message"]],
        ) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed CSV rows", skipped);
    }
    if entries.is_empty() {
        return Err(LogRagError::Parse(format!(
            "No valid log rows found. Expected header: {}",
            EXPECTED_HEADER
        )));
    }
    Ok(entries)
}

/// Parse free-form text logs.
///
/// Lines that split into the four fields become structured entries. Any other
/// line is kept as an `INFO` entry from an unknown source stamped with `now`.
#[inline]
pub fn parse_txt(content: &[u8], now: NaiveDateTime) -> Result<Vec<NewLogEntry>> {
    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let Some(first) = lines.first() else {
        return Err(LogRagError::Parse("Empty file".to_string()));
    };

    let first_delimiter = detect_txt_delimiter(first);
    let header = first_delimiter.and_then(|d| {
        let fields: Vec<String> = first.split(d).map(|f| f.trim().to_string()).collect();
        header_columns(&fields).map(|columns| (d, columns, fields.len()))
    });

    let body = if header.is_some() { &lines[1..] } else { &lines[..] };
    let mut fallbacks = 0usize;

    let entries: Vec<NewLogEntry> = body
        .iter()
        .map(|line| {
            let structured = match &header {
                Some((delimiter, columns, width)) => {
                    let fields: Vec<&str> = line.splitn(*width, *delimiter).map(str::trim).collect();
                    (fields.len() == *width)
                        .then(|| {
                            build_entry(
                                fields[columns["timestamp"]],
                                fields[columns["source"]],
                                fields[columns["severity"]],
                                fields[columns["message"]],
                            )
                        })
                        .flatten()
                }
                None => detect_txt_delimiter(line).or(first_delimiter).and_then(|d| {
                    let fields: Vec<&str> = line.splitn(4, d).map(str::trim).collect();
                    match fields.as_slice() {
                        [timestamp, source, severity, message] => {
                            build_entry(timestamp, source, severity, message)
                        }
                        _ => None,
                    }
                }),
            };

            structured.unwrap_or_else(|| {
                fallbacks += 1;
                NewLogEntry {
                    timestamp: now,
                    source: UNKNOWN_SOURCE.to_string(),
                    severity: Severity::Info,
                    message: (*line).to_string(),
                }
            })
        })
        .collect();

    if fallbacks > 0 {
        debug!("Stored {} unstructured lines as raw entries", fallbacks);
    }
    if entries.is_empty() {
        return Err(LogRagError::Parse("No log lines found".to_string()));
    }
    Ok(entries)
}

/// Parse a timestamp to naive UTC, whole seconds.
///
/// Accepts RFC 3339 with an offset, or `YYYY-MM-DD[T ]HH:MM:SS[.fff]`
/// taken as UTC.
#[inline]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let parsed = parse_with_offset(raw).or_else(|| {
        // a bare `Z` adds nothing to a naive UTC reading
        parse_naive(raw.strip_suffix(['Z', 'z']).unwrap_or(raw))
    })?;
    parsed.with_nanosecond(0)
}

fn parse_with_offset(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(raw, format).ok())
        })
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn ingestion_time() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn build_entry(timestamp: &str, source: &str, severity: &str, message: &str) -> Option<NewLogEntry> {
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    let timestamp = parse_timestamp(timestamp)?;
    let source = source.trim();

    Some(NewLogEntry {
        timestamp,
        source: if source.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            source.to_string()
        },
        severity: Severity::normalize(severity),
        message: message.to_string(),
    })
}

/// Column index of every required field, if all of them are present
fn header_columns<S: AsRef<str>>(fields: &[S]) -> Option<HashMap<&'static str, usize>> {
    let normalized: Vec<String> = fields
        .iter()
        .map(|f| f.as_ref().trim().to_ascii_lowercase())
        .collect();

    REQUIRED_FIELDS
        .iter()
        .map(|name| {
            normalized
                .iter()
                .position(|field| field == name)
                .map(|index| (*name, index))
        })
        .collect()
}

fn missing_header() -> LogRagError {
    LogRagError::Parse(format!(
        "Missing or invalid header. Expected: {} (columns may appear in any order)",
        EXPECTED_HEADER
    ))
}

/// The delimiter occurring most often outside quotes; comma when none occur
fn detect_csv_delimiter(header: &str) -> char {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut in_quotes = false;
    for c in header.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = DELIMITERS.iter().position(|d| *d == c) {
                counts[i] += 1;
            }
        }
    }

    counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .map_or(',', |(i, _)| DELIMITERS[i])
}

/// Prefer a delimiter that yields four fields, then one that yields two.
/// Earlier delimiters win ties; `None` when no delimiter appears.
fn detect_txt_delimiter(line: &str) -> Option<char> {
    let mut best: Option<(char, u8)> = None;
    for delimiter in DELIMITERS {
        let parts = line.split(delimiter).count();
        let score = u8::from(parts >= 4) * 2 + u8::from(parts >= 2);
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((delimiter, score));
        }
    }
    best.map(|(delimiter, _)| delimiter)
}

/// Split one CSV record, honoring double quotes and `""` escapes
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

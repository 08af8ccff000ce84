// Incident summary
// Dashboard digest of recent entries, optionally reworded by a hosted model


use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::database::{LogEntry, Severity};
use crate::generation::GeminiClient;

pub const WINDOW_DAYS: i64 = 7;
pub const PERIOD_LABEL: &str = "Last 7 days";
/// Newest entries considered before the window is applied
pub const MAX_ENTRIES: usize = 10_000;
pub const MAX_INCIDENTS: usize = 3;
pub const MAX_PATTERNS: usize = 5;
pub const MAX_ACTIONS: usize = 5;
/// Entries handed to the refiner as evidence
pub const SAMPLE_LIMIT: usize = 40;

const NIGHT_SHIFT_RATIO: f64 = 0.35;
const KIND_SCAN_LIMIT: usize = 10;
const REPEATED_ALERT_MIN: usize = 3;

/// Keyword family an entry's message falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueKind {
    Pressure,
    Temperature,
    Sensor,
    Power,
}

impl IssueKind {
    pub const ALL: [IssueKind; 4] = [
        IssueKind::Pressure,
        IssueKind::Temperature,
        IssueKind::Sensor,
        IssueKind::Power,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Pressure => "pressure",
            IssueKind::Temperature => "temperature",
            IssueKind::Sensor => "sensor",
            IssueKind::Power => "power",
        }
    }

    fn tokens(self) -> &'static [&'static str] {
        match self {
            IssueKind::Pressure => &["pressure", "psi", "valve", "drop", "fluctuat"],
            IssueKind::Temperature => &["temp", "temperature", "°c", "celsius", "overheat", "cool"],
            IssueKind::Sensor => &["sensor", "calibration", "calibrate", "reading"],
            IssueKind::Power => &["power", "voltage", "current", "amp", "outage"],
        }
    }

    /// First kind, in `ALL` order, with a token contained in `message`
    #[inline]
    pub fn classify(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.tokens().iter().any(|token| lower.contains(token)))
    }

    #[inline]
    pub fn root_cause_hint(kind: Option<Self>) -> &'static str {
        match kind {
            Some(IssueKind::Pressure) => {
                "Possible valve malfunction, blockage, regulator instability, or upstream supply variance"
            }
            Some(IssueKind::Temperature) => {
                "Cooling system performance degradation, increased load, or environmental factors"
            }
            Some(IssueKind::Sensor) => {
                "Sensor calibration drift, intermittent readings, or instrumentation issues"
            }
            Some(IssueKind::Power) => {
                "Power supply fluctuation, electrical subsystem fault, or upstream outage"
            }
            None => {
                "Requires further investigation; correlate with maintenance and operational context"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopIncident {
    pub incident: String,
    /// Earliest occurrence in the window, ISO 8601 with a trailing `Z`
    pub timestamp: String,
    pub severity: String,
    pub related_entries: usize,
    pub suspected_root_cause: String,
}

/// Incidents, patterns and actions before they are stamped into a summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDraft {
    pub top_incidents: Vec<TopIncident>,
    pub patterns_detected: Vec<String>,
    pub recommended_actions: Vec<String>,
}

impl SummaryDraft {
    /// Take each non-empty section of `refined`, keeping ours for the rest
    #[inline]
    pub fn merge(self, refined: SummaryDraft) -> SummaryDraft {
        SummaryDraft {
            top_incidents: pick(refined.top_incidents, self.top_incidents),
            patterns_detected: pick(refined.patterns_detected, self.patterns_detected),
            recommended_actions: pick(refined.recommended_actions, self.recommended_actions),
        }
    }
}

fn pick<T>(preferred: Vec<T>, fallback: Vec<T>) -> Vec<T> {
    if preferred.is_empty() { fallback } else { preferred }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentSummary {
    pub summary_generated_at: String,
    pub period: String,
    pub total_entries: usize,
    pub top_incidents: Vec<TopIncident>,
    pub patterns_detected: Vec<String>,
    pub recommended_actions: Vec<String>,
}

impl IncidentSummary {
    #[inline]
    pub fn new(now: DateTime<Utc>, total_entries: usize, draft: SummaryDraft) -> Self {
        Self {
            summary_generated_at: iso_z(now.naive_utc()),
            period: PERIOD_LABEL.to_string(),
            total_entries,
            top_incidents: draft.top_incidents,
            patterns_detected: draft.patterns_detected,
            recommended_actions: draft.recommended_actions,
        }
    }
}

fn iso_z(timestamp: NaiveDateTime) -> String {
    format!("{}Z", timestamp.format("%Y-%m-%dT%H:%M:%S"))
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The newest `MAX_ENTRIES` entries within `WINDOW_DAYS` of the latest one,
/// newest first.
///
/// The window is anchored on the data rather than the clock so historical
/// uploads still summarize.
#[inline]
pub fn recent_window(entries: &[LogEntry]) -> Vec<&LogEntry> {
    let mut newest: Vec<&LogEntry> = entries.iter().collect();
    newest.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.log_id.cmp(&a.log_id))
    });
    newest.truncate(MAX_ENTRIES);

    let Some(latest) = newest.first().map(|entry| entry.timestamp) else {
        return newest;
    };
    if let Some(cutoff) = latest.checked_sub_signed(Duration::days(WINDOW_DAYS)) {
        newest.retain(|entry| entry.timestamp >= cutoff);
    }
    newest
}

struct Cluster {
    title: String,
    severity: Severity,
    first_seen: NaiveDateTime,
    related_entries: usize,
    kind: Option<IssueKind>,
}

fn is_night_shift(timestamp: NaiveDateTime) -> bool {
    !(6..22).contains(&timestamp.hour())
}

fn by_count_desc<K: Ord + Copy>(counts: &BTreeMap<K, usize>) -> Vec<(K, usize)> {
    let mut ranked: Vec<(K, usize)> = counts.iter().map(|(k, c)| (*k, *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Group, rank and describe the entries of one window.
///
/// Incidents come from two groupings: (source, severity) and
/// (issue kind, source). Singleton groups below `ERROR` rank are dropped from
/// the first, every singleton from the second.
#[inline]
pub fn build_draft(window: &[&LogEntry]) -> SummaryDraft {
    if window.is_empty() {
        return SummaryDraft::default();
    }

    let mut by_source_severity: BTreeMap<(&str, Severity), Vec<&LogEntry>> = BTreeMap::new();
    let mut by_kind_source: BTreeMap<(IssueKind, &str), Vec<&LogEntry>> = BTreeMap::new();
    let mut source_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut alert_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut kind_counts: BTreeMap<IssueKind, usize> = BTreeMap::new();
    let mut severity_counts: HashMap<Severity, usize> = HashMap::new();
    let mut night = 0usize;

    for &entry in window {
        let source = entry.source.as_str();
        by_source_severity
            .entry((source, entry.severity))
            .or_default()
            .push(entry);
        *source_counts.entry(source).or_insert(0) += 1;
        *severity_counts.entry(entry.severity).or_insert(0) += 1;
        if entry.severity.rank() >= Severity::Warning.rank() {
            *alert_counts.entry(source).or_insert(0) += 1;
        }
        if let Some(kind) = IssueKind::classify(&entry.message) {
            by_kind_source.entry((kind, source)).or_default().push(entry);
            *kind_counts.entry(kind).or_insert(0) += 1;
        }
        if is_night_shift(entry.timestamp) {
            night += 1;
        }
    }

    let mut clusters = Vec::new();

    for ((source, severity), items) in &by_source_severity {
        if items.len() < 2 && severity.rank() < Severity::Error.rank() {
            continue;
        }
        let Some(first_seen) = items.iter().map(|e| e.timestamp).min() else {
            continue;
        };
        // last classified message among the first few wins
        let kind = items
            .iter()
            .take(KIND_SCAN_LIMIT)
            .filter_map(|entry| IssueKind::classify(&entry.message))
            .last();
        clusters.push(Cluster {
            title: format!("{} events on {}", capitalize(severity.as_str()), source),
            severity: *severity,
            first_seen,
            related_entries: items.len(),
            kind,
        });
    }

    for ((kind, source), items) in &by_kind_source {
        if items.len() < 2 {
            continue;
        }
        let Some(first_seen) = items.iter().map(|e| e.timestamp).min() else {
            continue;
        };
        let Some(severity) = items
            .iter()
            .map(|entry| entry.severity)
            .reduce(|worst, s| if s.rank() > worst.rank() { s } else { worst })
        else {
            continue;
        };
        clusters.push(Cluster {
            title: format!("{} issues on {}", capitalize(kind.as_str()), source),
            severity,
            first_seen,
            related_entries: items.len(),
            kind: Some(*kind),
        });
    }

    clusters.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| b.related_entries.cmp(&a.related_entries))
            .then_with(|| b.first_seen.cmp(&a.first_seen))
    });

    let top_incidents = clusters
        .into_iter()
        .take(MAX_INCIDENTS)
        .map(|cluster| TopIncident {
            incident: cluster.title,
            timestamp: iso_z(cluster.first_seen),
            severity: cluster.severity.to_string(),
            related_entries: cluster.related_entries,
            suspected_root_cause: IssueKind::root_cause_hint(cluster.kind).to_string(),
        })
        .collect();

    let mut patterns = Vec::new();

    let top_sources: Vec<String> = by_count_desc(&source_counts)
        .into_iter()
        .take(3)
        .map(|(source, count)| format!("{} ({})", source, count))
        .collect();
    patterns.push(format!("Most activity concentrated in: {}", top_sources.join(", ")));

    if night as f64 / window.len() as f64 >= NIGHT_SHIFT_RATIO {
        patterns.push("Alerts elevated during night shift (10PM-6AM)".to_string());
    }

    let dominant_kinds = by_count_desc(&kind_counts);
    if !dominant_kinds.is_empty() {
        let dominant: Vec<String> = dominant_kinds
            .iter()
            .take(2)
            .map(|(kind, count)| format!("{} ({})", kind.as_str(), count))
            .collect();
        patterns.push(format!("Dominant issue types: {}", dominant.join(", ")));
    }

    if let Some((source, count)) = by_count_desc(&alert_counts)
        .into_iter()
        .find(|(_, count)| *count >= REPEATED_ALERT_MIN)
    {
        patterns.push(format!(
            "{} shows repeated alert activity ({} WARNING+ entries)",
            source, count
        ));
    }
    patterns.truncate(MAX_PATTERNS);

    let mut actions = Vec::new();
    if severity_counts.contains_key(&Severity::Critical) {
        actions.push("Priority inspection for sources associated with CRITICAL events");
    }
    if severity_counts.contains_key(&Severity::Error) {
        actions.push("Review ERROR events for repeat causes and correlate with maintenance history");
    }
    if kind_counts.contains_key(&IssueKind::Pressure) {
        actions.push("Inspect pressure regulation components (valves/regulators) for affected units");
    }
    if kind_counts.contains_key(&IssueKind::Temperature) {
        actions.push("Review cooling system performance and maintenance schedule for affected units");
    }
    if kind_counts.contains_key(&IssueKind::Sensor) {
        actions.push("Calibrate sensors on units with frequent fluctuation or calibration messages");
    }
    actions.truncate(MAX_ACTIONS);

    SummaryDraft {
        top_incidents,
        patterns_detected: patterns,
        recommended_actions: actions.into_iter().map(str::to_string).collect(),
    }
}

/// Everything a refiner may look at
#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub period: String,
    pub total_entries: usize,
    pub draft: SummaryDraft,
    pub sample: Vec<LogEntry>,
}

/// Rewords a deterministic draft
pub trait SummaryRefiner: Send + Sync {
    fn name(&self) -> &str;

    /// May block on network I/O
    fn refine(&self, request: &RefineRequest) -> Result<SummaryDraft>;
}

#[inline]
pub fn build_refine_prompt(request: &RefineRequest) -> Result<String> {
    let sample: Vec<String> = request
        .sample
        .iter()
        .take(SAMPLE_LIMIT)
        .map(|entry| {
            format!(
                "- {} {} {}: {}",
                entry.timestamp_utc(),
                entry.source,
                entry.severity,
                entry.message
            )
        })
        .collect();
    let draft = serde_json::to_string(&request.draft).context("Failed to encode summary draft")?;

    Ok(format!(
        "You are writing a dashboard summary of industrial equipment logs.\n\
         Make the draft below more specific and operational.\n\
         Use only the evidence in the log sample and never invent units, counts or timestamps.\n\
         Keep it concise and reply with strict JSON only, no markdown.\n\n\
         Period: {}\n\
         Total entries: {}\n\n\
         Log sample:\n{}\n\n\
         Draft JSON:\n{}\n\n\
         Reply with an object holding exactly these keys:\n\
         {{\"top_incidents\": [{{\"incident\": str, \"timestamp\": str, \"severity\": str, \
         \"related_entries\": int, \"suspected_root_cause\": str}}], \
         \"patterns_detected\": [str], \"recommended_actions\": [str]}}\n",
        request.period,
        request.total_entries,
        sample.join("\n"),
        draft
    ))
}

#[derive(Debug, Deserialize)]
struct RawRefinement {
    #[serde(default)]
    top_incidents: Vec<serde_json::Value>,
    #[serde(default)]
    patterns_detected: Vec<serde_json::Value>,
    #[serde(default)]
    recommended_actions: Vec<serde_json::Value>,
}

fn non_blank_strings(values: Vec<serde_json::Value>, limit: usize) -> Vec<String> {
    values
        .into_iter()
        .take(limit)
        .filter_map(|value| match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
        .collect()
}

/// Decode a model reply into a draft.
///
/// Code fences are tolerated. Malformed incidents and non-string lines are
/// dropped one by one; a reply that is not a JSON object is `None`.
#[inline]
pub fn parse_refinement(text: &str) -> Option<SummaryDraft> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let raw: RawRefinement = serde_json::from_str(body.trim()).ok()?;

    let top_incidents = raw
        .top_incidents
        .into_iter()
        .take(MAX_INCIDENTS)
        .filter_map(|value| serde_json::from_value::<TopIncident>(value).ok())
        .collect();

    Some(SummaryDraft {
        top_incidents,
        patterns_detected: non_blank_strings(raw.patterns_detected, MAX_PATTERNS),
        recommended_actions: non_blank_strings(raw.recommended_actions, MAX_ACTIONS),
    })
}

impl SummaryRefiner for GeminiClient {
    fn name(&self) -> &str {
        self.model()
    }

    fn refine(&self, request: &RefineRequest) -> Result<SummaryDraft> {
        let prompt = build_refine_prompt(request)?;
        let text = self.generate_text(&prompt)?;
        parse_refinement(&text).context("Gemini returned an unusable summary")
    }
}

/// Builds summaries, trying the refiner when one is configured and keeping
/// the deterministic draft whenever it fails
#[derive(Clone, Default)]
pub struct SummaryService {
    refiner: Option<Arc<dyn SummaryRefiner>>,
}

impl SummaryService {
    #[inline]
    pub fn new(refiner: Option<Arc<dyn SummaryRefiner>>) -> Self {
        Self { refiner }
    }

    #[inline]
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let refiner: Option<Arc<dyn SummaryRefiner>> = if config.is_enabled() {
            let client =
                GeminiClient::new(config).context("Failed to initialize Gemini client")?;
            info!("Summaries are refined by {}", client.model());
            Some(Arc::new(client))
        } else {
            None
        };
        Ok(Self::new(refiner))
    }

    #[inline]
    pub fn refiner_name(&self) -> Option<&str> {
        self.refiner.as_deref().map(|refiner| refiner.name())
    }

    /// Never fails; the deterministic draft is always available
    pub async fn summarize(&self, entries: &[LogEntry], now: DateTime<Utc>) -> IncidentSummary {
        let window = recent_window(entries);
        let total = window.len();
        if total == 0 {
            return IncidentSummary::new(now, 0, SummaryDraft::default());
        }

        let draft = build_draft(&window);
        let Some(refiner) = &self.refiner else {
            return IncidentSummary::new(now, total, draft);
        };

        let request = RefineRequest {
            period: PERIOD_LABEL.to_string(),
            total_entries: total,
            draft: draft.clone(),
            sample: window.iter().take(SAMPLE_LIMIT).map(|&e| e.clone()).collect(),
        };
        let refiner = Arc::clone(refiner);

        let result = tokio::task::spawn_blocking(move || refiner.refine(&request))
            .await
            .context("Summary refinement task panicked")
            .and_then(|inner| inner);

        match result {
            Ok(refined) => {
                debug!("Summary refined");
                IncidentSummary::new(now, total, draft.merge(refined))
            }
            Err(e) => {
                warn!("Summary refinement failed, using deterministic draft: {:#}", e);
                IncidentSummary::new(now, total, draft)
            }
        }
    }
}

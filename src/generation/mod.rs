// Generation module
// Grounded answers from retrieved log entries, with a deterministic fallback

pub mod gemini;


use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::retrieval::RankedEntry;

pub use gemini::GeminiClient;

pub const DEFAULT_FOLLOWUP: &str =
    "Review the matching incidents and correlate them with maintenance and sensor data.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub suggested_followup: String,
}

/// Turns a question and its ranked candidates into an answer
pub trait AnswerGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// May block on network I/O
    fn generate(&self, question: &str, candidates: &[RankedEntry]) -> Result<GeneratedAnswer>;
}

/// Summarizes the strongest candidate without calling any model
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicGenerator;

impl HeuristicGenerator {
    #[inline]
    pub fn summarize(candidates: &[RankedEntry]) -> GeneratedAnswer {
        let Some(top) = candidates.first() else {
            return GeneratedAnswer {
                answer: "No relevant log entries were found. Ingest some logs first or rephrase the question.".to_string(),
                suggested_followup: "Ingest a recent log file and ask again, or try different keywords.".to_string(),
            };
        };

        let entry = &top.entry;
        let timestamp = entry.timestamp_utc();
        GeneratedAnswer {
            answer: format!(
                "Found {} relevant log {}. The strongest match is {} at {} from {}: {}",
                candidates.len(),
                if candidates.len() == 1 { "entry" } else { "entries" },
                entry.severity,
                timestamp,
                entry.source,
                entry.message
            ),
            suggested_followup: format!(
                "Review the entries from {} around {} and check them against maintenance notes and upstream conditions.",
                entry.source, timestamp
            ),
        }
    }
}

impl AnswerGenerator for HeuristicGenerator {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn generate(&self, _question: &str, candidates: &[RankedEntry]) -> Result<GeneratedAnswer> {
        Ok(Self::summarize(candidates))
    }
}

/// One line of prompt context per candidate
#[inline]
pub fn format_candidate(candidate: &RankedEntry) -> String {
    let entry = &candidate.entry;
    format!(
        "{} | {} | {} | {} | score={:.3}",
        entry.timestamp_utc(),
        entry.source,
        entry.severity,
        entry.message,
        candidate.score
    )
}

#[inline]
pub fn build_prompt(question: &str, candidates: &[RankedEntry], now: DateTime<Utc>) -> String {
    let context: Vec<String> = candidates.iter().map(format_candidate).collect();

    format!(
        "Current date and time: {}\n\
         You are an incident analyst reviewing industrial equipment logs.\n\
         Use ONLY the provided log excerpts to answer the question.\n\
         Be specific: counts, units, timestamps, sources.\n\
         If you are unsure, say what is missing.\n\n\
         Question:\n{}\n\n\
         Log excerpts:\n{}\n\n\
         Return exactly two lines:\n\
         1) Answer: <one paragraph>\n\
         2) Followup: <one sentence actionable next step>\n",
        now.format("%Y-%m-%d %H:%M UTC"),
        question,
        context.join("\n")
    )
}

/// Pull the `Answer:` and `Followup:` lines out of a model reply.
///
/// When the reply ignores the format, the whole text becomes the answer.
/// Returns `None` for an empty reply.
#[inline]
pub fn parse_response(text: &str) -> Option<GeneratedAnswer> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut answer = None;
    let mut followup = None;
    for line in text.lines() {
        let line = strip_numbering(line.trim());
        if let Some(rest) = strip_label(line, &["answer:"]) {
            answer.get_or_insert_with(|| rest.to_string());
        } else if let Some(rest) = strip_label(line, &["followup:", "follow-up:", "follow up:"]) {
            followup.get_or_insert_with(|| rest.to_string());
        }
    }

    let answer = answer
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| text.to_string());
    let suggested_followup = followup
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLLOWUP.to_string());

    Some(GeneratedAnswer {
        answer,
        suggested_followup,
    })
}

fn strip_numbering(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < line.len() {
        if let Some(stripped) = rest.strip_prefix(')').or_else(|| rest.strip_prefix('.')) {
            return stripped.trim_start();
        }
    }
    line
}

fn strip_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let lower = line.to_ascii_lowercase();
    labels
        .iter()
        .find(|label| lower.starts_with(*label))
        .map(|label| line[label.len()..].trim())
}

/// Answers with the hosted model when one is configured, falling back to the
/// heuristic when it is not, when there is nothing to ground on, or when the
/// hosted call fails
#[derive(Clone)]
pub struct AnswerService {
    hosted: Option<Arc<dyn AnswerGenerator>>,
    heuristic: HeuristicGenerator,
    context_limit: usize,
}

impl AnswerService {
    #[inline]
    pub fn new(hosted: Option<Arc<dyn AnswerGenerator>>, context_limit: usize) -> Self {
        Self {
            hosted,
            heuristic: HeuristicGenerator,
            context_limit: context_limit.max(1),
        }
    }

    #[inline]
    pub fn from_config(config: &GenerationConfig, context_limit: usize) -> Result<Self> {
        let hosted: Option<Arc<dyn AnswerGenerator>> = if config.is_enabled() {
            let client =
                GeminiClient::new(config).context("Failed to initialize Gemini client")?;
            info!("Answer generation uses {}", client.model());
            Some(Arc::new(client))
        } else {
            info!("Hosted generation disabled, using heuristic answers");
            None
        };
        Ok(Self::new(hosted, context_limit))
    }

    /// Name of the generator that will be tried first
    #[inline]
    pub fn primary_name(&self) -> &str {
        self.hosted
            .as_deref()
            .map_or(self.heuristic.name(), |hosted| hosted.name())
    }

    /// Never fails; the heuristic answer is always available
    pub async fn answer(&self, question: &str, candidates: &[RankedEntry]) -> GeneratedAnswer {
        if let (Some(hosted), false) = (&self.hosted, candidates.is_empty()) {
            let hosted = Arc::clone(hosted);
            let question_owned = question.to_string();
            let context: Vec<RankedEntry> =
                candidates.iter().take(self.context_limit).cloned().collect();

            let result =
                tokio::task::spawn_blocking(move || hosted.generate(&question_owned, &context))
                    .await
                    .context("Generation task panicked")
                    .and_then(|inner| inner);

            match result {
                Ok(answer) => {
                    debug!("Hosted generator answered");
                    return answer;
                }
                Err(e) => warn!("Hosted generation failed, using heuristic answer: {:#}", e),
            }
        }

        HeuristicGenerator::summarize(candidates)
    }
}

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{AnswerGenerator, GeneratedAnswer, build_prompt, parse_response};
use crate::config::GenerationConfig;
use crate::retrieval::RankedEntry;

const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Blocking client for the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Requires an API key from the environment or the config file
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .context("No Gemini API key configured")?;

        let base = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Gemini API URL: {}", config.api_url))?;
        let endpoint = base
            .join(&format!("/v1beta/models/{}:generateContent", config.model))
            .context("Failed to build Gemini endpoint URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send a prompt and return the concatenated text of the first candidate
    #[inline]
    pub fn generate_text(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Ok(String::new());
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize Gemini request")?;

        debug!("Requesting completion from {}", self.model);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(self.endpoint.as_str())
                    .header("Content-Type", "application/json")
                    .header("x-goog-api-key", &self.api_key)
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Gemini request failed")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse Gemini response")?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(ureq::Error::StatusCode(status)) if status < 500 && status != 429 => {
                    warn!("Gemini rejected the request with status {}", status);
                    return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                }
                Err(error) => {
                    warn!(
                        "Gemini request failed: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for Gemini request");

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl AnswerGenerator for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, question: &str, candidates: &[RankedEntry]) -> Result<GeneratedAnswer> {
        let prompt = build_prompt(question, candidates, Utc::now());
        let text = self.generate_text(&prompt)?;
        parse_response(&text).context("Gemini returned an empty answer")
    }
}

//! Reasoning advisor abstraction.
//!
//! The advisor is an external service consulted for next-question selection.
//! Its output is untrusted advice: the selector validates every suggestion
//! against the candidate set and falls back deterministically when the
//! advisor is absent, slow, or wrong. Supports real backends (Ollama,
//! OpenAI-compatible) and fake advisors for testing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{FunctionalModule, Question, SeedMetrics, SymptomCluster};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Advisor backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
        }
    }
}

/// Advisor failures. All of them degrade to the deterministic fallback and
/// never surface to the caller of a turn.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("advisor timed out after {0}ms")]
    Timeout(u64),

    #[error("advisor returned empty response")]
    Empty,
}

/// The advisor's pick among the offered candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub question_id: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Condensed assessment state shown to the advisor alongside the candidates.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisorContext {
    pub module: FunctionalModule,
    /// `(question text, rendered answer)` for the most recent answers.
    pub recent_responses: Vec<(String, String)>,
    pub clusters: Vec<SymptomCluster>,
    /// `(module, 0-100 score)` pairs.
    pub module_scores: Vec<(FunctionalModule, f64)>,
    pub seed_metrics: SeedMetrics,
    pub questions_asked: usize,
    pub budget_remaining: usize,
    /// Exit-policy hint for the current module.
    pub negative_percentage: f64,
    pub average_severity: f64,
    pub questions_before_exit: usize,
}

/// External next-question oracle.
pub trait Advisor: Send + Sync {
    /// Propose one of `candidates`. The returned id is advice, not a
    /// decision; callers must validate it.
    fn propose<'a>(
        &'a self,
        candidates: &'a [&'a Question],
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>>;
}

impl<T: Advisor + ?Sized> Advisor for std::sync::Arc<T> {
    fn propose<'a>(
        &'a self,
        candidates: &'a [&'a Question],
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>> {
        (**self).propose(candidates, context)
    }
}

// ============================================================================
// HTTP advisor
// ============================================================================

/// Real advisor over an Ollama or OpenAI-compatible endpoint.
pub struct HttpAdvisor {
    config: AdvisorConfig,
    client: reqwest::Client,
}

impl HttpAdvisor {
    pub fn new(config: AdvisorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self { config, client })
    }

    fn is_ollama_endpoint(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    fn build_prompt(candidates: &[&Question], context: &AdvisorContext) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Current module: {} ({} questions asked so far, budget for about {} more).\n",
            context.module, context.questions_asked, context.budget_remaining
        ));
        prompt.push_str(&format!(
            "Module signal: {:.0}% negative answers, average severity {:.1}/5, {} questions before early exit.\n",
            context.negative_percentage, context.average_severity, context.questions_before_exit
        ));

        if !context.clusters.is_empty() {
            prompt.push_str("Detected symptom clusters:\n");
            for cluster in &context.clusters {
                prompt.push_str(&format!(
                    "  - {} (confidence {:.2}, severity {:?})\n",
                    cluster.name, cluster.confidence, cluster.severity
                ));
            }
        }

        prompt.push_str("Module scores:\n");
        for (module, score) in &context.module_scores {
            prompt.push_str(&format!("  - {module}: {score:.0}/100\n"));
        }
        prompt.push_str(&format!(
            "Dietary oil metrics: exposure {:.1}/10, damage {:.1}/10.\n",
            context.seed_metrics.exposure_level, context.seed_metrics.damage_indicators
        ));

        if !context.recent_responses.is_empty() {
            prompt.push_str("Recent answers:\n");
            for (text, answer) in &context.recent_responses {
                prompt.push_str(&format!("  - {text} -> {answer}\n"));
            }
        }

        prompt.push_str("\nCandidate questions:\n");
        for q in candidates {
            prompt.push_str(&format!("  - [{}] {}\n", q.id, q.text));
        }
        prompt.push_str(
            "\nPick the single most informative next question for this client.",
        );
        prompt
    }

    async fn call_ollama(&self, prompt: &str) -> Result<Suggestion, AdvisorError> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisorError::Http(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AdvisorError::Http(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::InvalidJson(format!("failed to parse response: {e}")))?;
        let text = json
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or(AdvisorError::Empty)?;
        serde_json::from_str(text)
            .map_err(|e| AdvisorError::InvalidJson(format!("advisor output is not valid JSON: {e}")))
    }

    async fn call_openai_compatible(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Suggestion, AdvisorError> {
        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdvisorError::Http(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AdvisorError::Http(format!(
                "HTTP {} from OpenAI-compatible API",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::InvalidJson(format!("failed to parse response: {e}")))?;
        let text = json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .ok_or(AdvisorError::Empty)?;
        serde_json::from_str(text)
            .map_err(|e| AdvisorError::InvalidJson(format!("advisor output is not valid JSON: {e}")))
    }
}

const SYSTEM_PROMPT: &str = "You are a functional-medicine intake assistant. \
Given the assessment state and a list of candidate questions, respond with \
JSON: {\"questionId\": \"<id from the candidate list>\", \"reasoning\": \"<one sentence>\"}";

impl Advisor for HttpAdvisor {
    fn propose<'a>(
        &'a self,
        candidates: &'a [&'a Question],
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>> {
        Box::pin(async move {
            if !self.config.enabled {
                return Err(AdvisorError::Disabled);
            }

            let prompt = format!("{SYSTEM_PROMPT}\n\n{}", Self::build_prompt(candidates, context));

            if self.is_ollama_endpoint() {
                match self.call_ollama(&prompt).await {
                    Ok(suggestion) => return Ok(suggestion),
                    Err(e) => {
                        debug!("Ollama API failed, trying OpenAI-compatible: {e}");
                    }
                }
            }

            self.call_openai_compatible(SYSTEM_PROMPT, &prompt).await
        })
    }
}

// ============================================================================
// Timeout decorator
// ============================================================================

/// Wraps an advisor so a call always resolves inside the configured budget.
pub struct TimedAdvisor<A> {
    inner: A,
    budget: Duration,
}

impl<A: Advisor> TimedAdvisor<A> {
    pub fn new(inner: A, budget: Duration) -> Self {
        Self { inner, budget }
    }
}

impl<A: Advisor> Advisor for TimedAdvisor<A> {
    fn propose<'a>(
        &'a self,
        candidates: &'a [&'a Question],
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.budget, self.inner.propose(candidates, context)).await
            {
                Ok(Ok(suggestion)) => Ok(suggestion),
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    warn!(budget_ms = self.budget.as_millis() as u64, "advisor timed out");
                    Err(AdvisorError::Timeout(self.budget.as_millis() as u64))
                }
            }
        })
    }
}

// ============================================================================
// Fake advisor
// ============================================================================

/// Scripted advisor for tests: replays a queue of canned results, repeating
/// the last entry once the queue runs down to one.
pub struct FakeAdvisor {
    responses: std::sync::Mutex<Vec<Result<Suggestion, AdvisorError>>>,
    call_count: std::sync::Mutex<usize>,
}

impl FakeAdvisor {
    pub fn new(responses: Vec<Result<Suggestion, AdvisorError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            call_count: std::sync::Mutex::new(0),
        }
    }

    /// Always suggests the given id.
    pub fn always(question_id: &str) -> Self {
        Self::new(vec![Ok(Suggestion {
            question_id: question_id.to_string(),
            reasoning: "scripted".to_string(),
        })])
    }

    pub fn always_error(error: AdvisorError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        match self.call_count.lock() {
            Ok(count) => *count,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Advisor for FakeAdvisor {
    fn propose<'a>(
        &'a self,
        _candidates: &'a [&'a Question],
        _context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>> {
        Box::pin(async move {
            if let Ok(mut count) = self.call_count.lock() {
                *count += 1;
            }

            let mut responses = match self.responses.lock() {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            if responses.is_empty() {
                return Err(AdvisorError::Empty);
            }
            if responses.len() == 1 {
                responses[0].clone()
            } else {
                responses.remove(0)
            }
        })
    }
}

/// Advisor that never resolves. Exercises the timeout path in tests.
pub struct StalledAdvisor;

impl Advisor for StalledAdvisor {
    fn propose<'a>(
        &'a self,
        _candidates: &'a [&'a Question],
        _context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Result<Suggestion, AdvisorError>> {
        Box::pin(std::future::pending())
    }
}

//! Classification client: one batch request resolved through a small state
//! machine.
//!
//! The HTTP edge is isolated behind `ClassifyTransport` so the retry logic
//! is testable against scripted responses. The per-attempt decision is a
//! pure function of (status code, fallback availability):
//!
//! - 404 → switch to the fallback model, at most once per batch chain
//! - 400/403 → remove the credential and re-attempt with another
//! - 429/503 → randomized backoff, unbounded retries
//! - other non-2xx, unreadable bodies → the whole batch is tagged `Error`
//!
//! `PoolExhausted` and `Cancelled` are the only conditions that escape to
//! the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScreenError;
use crate::extract::extract_json_array;
use crate::keypool::{redact_key, CredentialPool, RandomSource};
use crate::label::normalize_label;
use crate::orchestrator::CancelFlag;
use crate::prompt;
use crate::types::{ClassificationItem, ItemId, Outcome, RiskLevel, ScreenConfig};

/// Base wait on a 429/503 before re-attempting.
pub const BACKOFF_BASE: Duration = Duration::from_millis(2000);
/// Random extra wait added on top of the base.
pub const BACKOFF_JITTER: Duration = Duration::from_millis(3000);

// ──────────────────────────────────────────────
// Wire format
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    pub response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerateContentRequest {
    /// Standard screening request: one user part, a system instruction, and
    /// a JSON response type.
    pub fn screening(prompt: &str, system: &str, temperature: Option<f32>) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: Some(Content {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
                temperature,
            }),
        }
    }

    /// Minimal request used by the credential probe.
    pub fn probe(text: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
            system_instruction: None,
            generation_config: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Extract the first candidate's first text part.
fn first_candidate_text(body: &str) -> Result<String, ScreenError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ScreenError::JsonParsing(e.to_string()))?;
    parsed
        .candidates
        .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|mut p| if p.is_empty() { None } else { Some(p.remove(0)) })
        .and_then(|p| p.text)
        .ok_or_else(|| ScreenError::MalformedResponse("no response content".into()))
}

// ──────────────────────────────────────────────
// Transport seam
// ──────────────────────────────────────────────

/// Status and raw body of one upstream exchange.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

/// The outbound HTTP edge. Mocked in tests with scripted replies.
#[async_trait]
pub trait ClassifyTransport: Send + Sync {
    async fn generate(
        &self,
        endpoint: &str,
        model: &str,
        credential: &str,
        request: &GenerateContentRequest,
    ) -> Result<TransportReply, ScreenError>;
}

/// reqwest-backed transport for the generateContent API.
pub struct GeminiTransport {
    client: reqwest::Client,
}

impl GeminiTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for GeminiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifyTransport for GeminiTransport {
    async fn generate(
        &self,
        endpoint: &str,
        model: &str,
        credential: &str,
        request: &GenerateContentRequest,
    ) -> Result<TransportReply, ScreenError> {
        let url = format!("{endpoint}/models/{model}:generateContent?key={credential}");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ScreenError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportReply { status, body })
    }
}

// ──────────────────────────────────────────────
// Retry decision
// ──────────────────────────────────────────────

/// What the state machine does with one upstream status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 2xx: parse the body.
    Proceed,
    /// The model identifier is unknown; re-attempt on the fallback model.
    SwitchToFallback,
    /// The credential was rejected; remove it and re-attempt with another.
    RemoveCredential,
    /// Upstream is overloaded; wait and re-attempt with the same credential.
    Backoff,
    /// Unrecoverable for this batch; every item gets `Error`.
    FailBatch,
}

/// Pure status-code → action mapping. `can_fall_back` is false once the
/// fallback has been used (or when no distinct fallback exists).
pub fn decide(status: u16, can_fall_back: bool) -> RetryDecision {
    match status {
        200..=299 => RetryDecision::Proceed,
        404 if can_fall_back => RetryDecision::SwitchToFallback,
        404 => RetryDecision::FailBatch,
        400 | 403 => RetryDecision::RemoveCredential,
        429 | 503 => RetryDecision::Backoff,
        _ => RetryDecision::FailBatch,
    }
}

// ──────────────────────────────────────────────
// Batch classifier
// ──────────────────────────────────────────────

/// Drives one prompt through the retry/backoff/fallback state machine and
/// turns batch responses into complete outcome maps.
pub struct BatchClassifier {
    transport: Arc<dyn ClassifyTransport>,
    rng: Arc<dyn RandomSource>,
    config: ScreenConfig,
}

impl BatchClassifier {
    pub fn new(
        transport: Arc<dyn ClassifyTransport>,
        rng: Arc<dyn RandomSource>,
        config: ScreenConfig,
    ) -> Self {
        Self {
            transport,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    /// Classify one chunk. Never returns a partial map: every input id is
    /// present, defaulting to `Low`/"no signal" when the response omits it.
    /// Only `PoolExhausted` and `Cancelled` surface as errors.
    pub async fn classify_batch(
        &self,
        items: &[ClassificationItem],
        pool: &CredentialPool,
        cancel: &CancelFlag,
    ) -> Result<HashMap<ItemId, Outcome>, ScreenError> {
        let user_prompt = prompt::bulk_prompt(items);
        match self
            .exchange(&user_prompt, prompt::BULK_SYSTEM_INSTRUCTION, pool, cancel)
            .await
        {
            Ok(text) => Ok(outcomes_from_text(items, &text)),
            Err(e) if e.is_run_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, batch_len = items.len(), "batch failed, tagging items Error");
                Ok(error_fill(items, &e.to_string()))
            }
        }
    }

    /// Run one logical request chain: pick a credential, send, and apply the
    /// retry decision until the exchange resolves. Returns the model text on
    /// success; errors are batch-fatal except `PoolExhausted`/`Cancelled`.
    pub async fn exchange(
        &self,
        user_prompt: &str,
        system: &str,
        pool: &CredentialPool,
        cancel: &CancelFlag,
    ) -> Result<String, ScreenError> {
        let request =
            GenerateContentRequest::screening(user_prompt, system, self.config.temperature);
        let mut fallback_used = false;
        // Pinned across backoff retries; cleared when proven invalid.
        let mut pinned: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ScreenError::Cancelled);
            }

            let credential = match pinned.take() {
                Some(c) => c,
                None => pool.pick(self.rng.as_ref())?,
            };
            let model = if fallback_used {
                &self.config.models.fallback
            } else {
                &self.config.models.primary
            };

            let reply = self
                .transport
                .generate(&self.config.endpoint, model, &credential, &request)
                .await?;

            let can_fall_back = !fallback_used && self.config.models.can_fall_back();
            match decide(reply.status, can_fall_back) {
                RetryDecision::Proceed => return first_candidate_text(&reply.body),
                RetryDecision::SwitchToFallback => {
                    tracing::warn!(
                        model = %model,
                        fallback = %self.config.models.fallback,
                        "model not found, retrying on fallback"
                    );
                    fallback_used = true;
                    pinned = Some(credential);
                }
                RetryDecision::RemoveCredential => {
                    tracing::warn!(
                        status = reply.status,
                        credential = %redact_key(&credential),
                        "credential rejected, removing from pool"
                    );
                    pool.remove(&credential);
                    if pool.is_empty() {
                        return Err(ScreenError::PoolExhausted);
                    }
                }
                RetryDecision::Backoff => {
                    let delay = BACKOFF_BASE + self.rng.jitter(BACKOFF_JITTER);
                    tracing::debug!(
                        status = reply.status,
                        delay_ms = delay.as_millis() as u64,
                        "upstream overloaded, backing off"
                    );
                    pinned = Some(credential);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::FailBatch => return Err(ScreenError::Upstream(reply.status)),
            }
        }
    }
}

/// One entry of the model's JSON array. The id may arrive as a number or a
/// numeric string.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    id: serde_json::Value,
    risk_level: Option<String>,
    reason: Option<String>,
}

fn coerce_id(value: &serde_json::Value) -> Option<ItemId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn model text into a complete outcome map for `items`. Malformed array
/// entries are skipped; parse failures of the whole text tag the batch
/// `Error`.
fn outcomes_from_text(
    items: &[ClassificationItem],
    text: &str,
) -> HashMap<ItemId, Outcome> {
    let json = match extract_json_array(text) {
        Ok(json) => json,
        Err(e) => return error_fill(items, &e.to_string()),
    };
    let entries: Vec<serde_json::Value> = match serde_json::from_str(&json) {
        Ok(entries) => entries,
        Err(e) => return error_fill(items, &format!("JSON parsing error: {e}")),
    };

    let mut verdicts: HashMap<ItemId, Outcome> = HashMap::new();
    for entry in &entries {
        let Ok(raw) = serde_json::from_value::<RawVerdict>(entry.clone()) else {
            continue;
        };
        let Some(id) = coerce_id(&raw.id) else {
            continue;
        };
        verdicts.insert(
            id,
            Outcome {
                id,
                risk: normalize_label(raw.risk_level.as_deref()),
                reason: raw.reason.unwrap_or_default(),
            },
        );
    }

    items
        .iter()
        .map(|item| {
            let outcome = verdicts.remove(&item.id).unwrap_or_else(|| Outcome {
                id: item.id,
                risk: RiskLevel::Low,
                reason: "no signal".to_string(),
            });
            (item.id, outcome)
        })
        .collect()
}

/// Every item tagged `Error` with the failure reason.
fn error_fill(items: &[ClassificationItem], reason: &str) -> HashMap<ItemId, Outcome> {
    items
        .iter()
        .map(|item| {
            (
                item.id,
                Outcome {
                    id: item.id,
                    risk: RiskLevel::Error,
                    reason: reason.to_string(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic random source: always index 0, zero jitter.
    pub struct FirstPickSource;

    impl RandomSource for FirstPickSource {
        fn pick_index(&self, _len: usize) -> usize {
            0
        }

        fn jitter(&self, _max: Duration) -> Duration {
            Duration::ZERO
        }
    }

    /// Transport returning a scripted sequence of replies, recording the
    /// (model, credential) of each call.
    pub struct MockTransport {
        replies: Mutex<Vec<Result<TransportReply, ScreenError>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl MockTransport {
        pub fn new(replies: Vec<Result<TransportReply, ScreenError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(body: &str) -> Result<TransportReply, ScreenError> {
            Ok(TransportReply {
                status: 200,
                body: body.to_string(),
            })
        }

        pub fn status(status: u16) -> Result<TransportReply, ScreenError> {
            Ok(TransportReply {
                status,
                body: String::new(),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ClassifyTransport for MockTransport {
        async fn generate(
            &self,
            _endpoint: &str,
            model: &str,
            credential: &str,
            _request: &GenerateContentRequest,
        ) -> Result<TransportReply, ScreenError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), credential.to_string()));
            let mut replies = self.replies.lock().unwrap();
            assert!(!replies.is_empty(), "mock transport ran out of replies");
            replies.remove(0)
        }
    }

    /// Wrap model text in a minimal generateContent response body.
    pub fn gemini_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [
                {"content": {"parts": [{"text": text}]}}
            ]
        })
        .to_string()
    }
}

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::config::PlannerConfig;
use crate::services::catalog::{ResourceRef, SkillRef};
use crate::services::plan::ActivityKind;
use crate::services::progress::StreakInfo;

const MAX_RETRIES: usize = 2;
const BASE_BACKOFF_MS: u64 = 200;

const MIN_ACTIVITY_MINUTES: i64 = 1;
const MAX_ACTIVITY_MINUTES: i64 = 60;

/// Due-review volume below this is not worth a degraded one-item plan.
pub const FALLBACK_DUE_THRESHOLD: i64 = 5;
pub const FALLBACK_MAX_MINUTES: i64 = 15;

pub const FALLBACK_RATIONALE: &str =
    "Fallback plan: the generative planner was unavailable or returned nothing usable, \
     so today's plan was derived from due-review counts only.";

/// Progress context handed to the planner. Everything here comes from the
/// aggregator; the planner gets no other input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerContext {
    pub due_vocab_count: i64,
    pub seven_day_success_rate: f64,
    pub total_attempts: i64,
    pub average_mastery_score: f64,
    pub streak: StreakInfo,
    pub resources: Vec<ResourceRef>,
    pub skills: Vec<SkillRef>,
}

#[derive(Debug, Clone)]
pub struct ProposedActivity {
    pub activity_kind: ActivityKind,
    pub resource_id: Option<String>,
    pub skill_id: Option<String>,
    pub estimated_minutes: i64,
    pub priority: i64,
}

#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub activities: Vec<ProposedActivity>,
    pub rationale: String,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

/// The external generative planner, seen through a narrow seam so the
/// orchestrator (and its tests) never depend on the wire client.
pub trait GenerativePlanner: Send + Sync + 'static {
    fn generate(
        &self,
        ctx: &PlannerContext,
    ) -> impl Future<Output = Result<GeneratedPlan, PlannerError>> + Send;
}

/// Deterministic aggregator-only plan used whenever generation fails or
/// produces nothing. At most one vocabulary-review item, sized by the due
/// backlog; the rationale always announces the degraded mode so the UI and
/// logs can tell it apart from a genuine recommendation.
pub fn fallback_plan(due_vocab_count: i64) -> GeneratedPlan {
    let mut activities = Vec::new();
    if due_vocab_count >= FALLBACK_DUE_THRESHOLD {
        activities.push(ProposedActivity {
            activity_kind: ActivityKind::VocabularyReview,
            resource_id: None,
            skill_id: None,
            estimated_minutes: (due_vocab_count / 4).min(FALLBACK_MAX_MINUTES),
            priority: 1,
        });
    }

    GeneratedPlan {
        activities,
        rationale: FALLBACK_RATIONALE.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawGeneratedPlan {
    #[serde(default)]
    activities: Vec<serde_json::Value>,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivity {
    activity_kind: String,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    skill_id: Option<String>,
    #[serde(default)]
    estimated_minutes: Option<i64>,
    #[serde(default)]
    priority: Option<i64>,
}

/// OpenAI-compatible chat-completions client for plan generation.
#[derive(Clone)]
pub struct LlmPlanner {
    config: PlannerConfig,
    client: reqwest::Client,
}

impl LlmPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(PlannerConfig::from_env())
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, PlannerError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PlannerError::NotConfigured("LLM_API_KEY"))?;

        let url = format!(
            "{}/chat/completions",
            self.config.api_endpoint.trim_end_matches('/')
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
            "stream": false,
        });

        let mut last_error: Option<PlannerError> = None;
        for retry in 0..=MAX_RETRIES {
            match self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: ChatResponse = resp.json().await?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or(PlannerError::EmptyChoices);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = PlannerError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "planner request failed, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = PlannerError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "planner request error, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(PlannerError::EmptyChoices))
    }
}

impl GenerativePlanner for LlmPlanner {
    fn generate(
        &self,
        ctx: &PlannerContext,
    ) -> impl Future<Output = Result<GeneratedPlan, PlannerError>> + Send {
        async move {
            let context_json = serde_json::to_string(ctx)?;
            let content = self.chat(SYSTEM_PROMPT, &context_json).await?;
            parse_generated_plan(&content)
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a language-learning coach. Given the learner's \
progress context as JSON, propose today's study activities. Respond with JSON only: \
{\"activities\": [{\"activityKind\": \"VOCABULARY_REVIEW|READING|LISTENING|SHADOWING|CLOZE|TRANSLATION|CONVERSATION\", \
\"resourceId\": string?, \"skillId\": string?, \"estimatedMinutes\": number, \"priority\": number}], \
\"rationale\": string}. Lower priority numbers come first. Keep the plan under 60 minutes total.";

/// Best-effort conversion of planner output. Individual activities that do
/// not parse or carry an unknown kind are skipped with a warning; only a
/// fully unreadable payload is an error.
fn parse_generated_plan(content: &str) -> Result<GeneratedPlan, PlannerError> {
    let raw: RawGeneratedPlan = serde_json::from_str(strip_code_fences(content))?;

    let mut activities = Vec::with_capacity(raw.activities.len());
    for value in raw.activities {
        let parsed: RawActivity = match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "skipping unparseable proposed activity");
                continue;
            }
        };
        let Some(kind) = ActivityKind::parse(&parsed.activity_kind) else {
            warn!(kind = %parsed.activity_kind, "skipping activity with unknown kind");
            continue;
        };
        activities.push(ProposedActivity {
            activity_kind: kind,
            resource_id: parsed.resource_id.filter(|v| !v.trim().is_empty()),
            skill_id: parsed.skill_id.filter(|v| !v.trim().is_empty()),
            estimated_minutes: parsed
                .estimated_minutes
                .unwrap_or(MIN_ACTIVITY_MINUTES)
                .clamp(MIN_ACTIVITY_MINUTES, MAX_ACTIVITY_MINUTES),
            priority: parsed.priority.unwrap_or(i64::MAX).max(1),
        });
    }

    Ok(GeneratedPlan {
        activities,
        rationale: raw.rationale,
    })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

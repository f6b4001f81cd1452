//! Escalation of ambiguous pairs to an external text-generation judge.
//!
//! The rules engine settles the easy majority; what is left is packaged into a
//! [`JudgeRequest`], sent to a [`Judge`], and the answer parsed into a
//! [`Judgement`]. Any failure along the way (transport, status, timeout,
//! unparseable answer) yields a "keep both" verdict instead of an error.

use std::time::Duration;

use actionlog_core::similarity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::verdict::{Decision, Method, Recommendation, Verdict};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("judge returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("judge did not answer within {0:?}")]
    Timeout(Duration),
    #[error("judge response had no text content")]
    EmptyResponse,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid judgement: {0}")]
    InvalidJudgement(String),
}

// ── Prompt ──

const SYSTEM_PROMPT: &str = "\
You review action items from a project tracker and decide whether two of them are duplicates.

Two items are duplicates if they represent THE SAME TASK or REQUEST, even if worded differently.
Items are NOT duplicates if they are RELATED but represent DIFFERENT ACTIONS \
(e.g. \"get timeline\" vs \"escalate timeline\").

Key considerations:
- Same topic but different actions = NOT duplicate (e.g. \"review document\" vs \"send document\")
- Same request with different wording = DUPLICATE
- Follow-up on the same item = duplicate only if it adds no new action
- Slight variations in phrasing = DUPLICATE

Respond ONLY with a JSON object:
{
  \"is_duplicate\": true or false,
  \"confidence\": number between 0.0 and 1.0,
  \"reasoning\": \"one or two sentences\",
  \"recommendation\": \"mark_duplicate\" | \"keep_both\" | \"merge\",
  \"suggested_merged_text\": \"combined wording if recommending merge, otherwise null\"
}";

/// The two items put in front of the judge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeRequest {
    pub item_a: String,
    pub item_b: String,
    pub context_a: Option<String>,
    pub context_b: Option<String>,
}

impl JudgeRequest {
    pub fn new(item_a: &str, item_b: &str) -> Self {
        Self {
            item_a: item_a.to_string(),
            item_b: item_b.to_string(),
            context_a: None,
            context_b: None,
        }
    }

    pub fn with_context(mut self, context_a: Option<String>, context_b: Option<String>) -> Self {
        self.context_a = context_a.filter(|c| !c.trim().is_empty());
        self.context_b = context_b.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    pub fn user_prompt(&self) -> String {
        let mut out = String::new();
        push_item(&mut out, "ITEM 1", &self.item_a, self.context_a.as_deref());
        out.push('\n');
        push_item(&mut out, "ITEM 2", &self.item_b, self.context_b.as_deref());
        out
    }
}

fn push_item(out: &mut String, label: &str, text: &str, context: Option<&str>) {
    out.push_str(label);
    out.push_str(":\n");
    out.push_str(text.trim());
    out.push('\n');
    if let Some(ctx) = context {
        out.push_str("Context: ");
        out.push_str(ctx.trim());
        out.push('\n');
    }
}

// ── Judgement parsing ──

/// The judge's structured answer, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub is_duplicate: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub recommendation: Recommendation,
    pub suggested_merged_text: Option<String>,
}

#[derive(Deserialize)]
struct RawJudgement {
    is_duplicate: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default)]
    suggested_merged_text: Option<String>,
}

impl Judgement {
    pub fn into_verdict(self, similarity: f64) -> Verdict {
        Verdict {
            decision: if self.is_duplicate {
                Decision::Duplicate
            } else {
                Decision::Distinct
            },
            confidence: self.confidence,
            method: Method::Escalated,
            reasoning: self.reasoning,
            recommendation: self.recommendation,
            suggested_merged_text: self.suggested_merged_text,
            similarity,
        }
    }
}

/// Parse a judge answer. Code fences and surrounding prose are tolerated.
pub fn parse_judgement(raw: &str) -> Result<Judgement, EscalationError> {
    let body = strip_code_fence(raw);
    let parsed: RawJudgement = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => match outermost_object(body) {
            Some(obj) if obj.len() < body.len() => serde_json::from_str(obj)?,
            _ => return Err(e.into()),
        },
    };

    if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(EscalationError::InvalidJudgement(format!(
            "confidence {} outside [0, 1]",
            parsed.confidence
        )));
    }

    let recommendation = match parsed.recommendation.as_deref().map(str::trim) {
        Some("mark_duplicate") => Recommendation::MarkDuplicate,
        Some("keep_both") => Recommendation::KeepBoth,
        Some("merge") => Recommendation::Merge,
        Some("review_manually") => Recommendation::ReviewManually,
        _ if parsed.is_duplicate => Recommendation::MarkDuplicate,
        _ => Recommendation::KeepBoth,
    };
    if !parsed.is_duplicate && recommendation != Recommendation::KeepBoth {
        return Err(EscalationError::InvalidJudgement(format!(
            "not a duplicate but recommends {}",
            recommendation.as_str()
        )));
    }
    if parsed.is_duplicate
        && matches!(
            recommendation,
            Recommendation::KeepBoth | Recommendation::ReviewManually
        )
    {
        return Err(EscalationError::InvalidJudgement(format!(
            "duplicate but recommends {}",
            recommendation.as_str()
        )));
    }

    let suggested_merged_text = parsed
        .suggested_merged_text
        .filter(|t| !t.trim().is_empty() && recommendation == Recommendation::Merge);

    Ok(Judgement {
        is_duplicate: parsed.is_duplicate,
        confidence: parsed.confidence,
        reasoning: parsed.reasoning,
        recommendation,
        suggested_merged_text,
    })
}

/// Contents of the first fenced block, or the trimmed input if unfenced.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after
        .strip_prefix("json")
        .or_else(|| after.strip_prefix("JSON"))
        .unwrap_or(after);
    let end = after.find("```").unwrap_or(after.len());
    after[..end].trim()
}

fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

// ── Judges ──

/// Anything that can answer a [`JudgeRequest`] with raw text.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Model or service name, for logs and reports.
    fn name(&self) -> &str;

    async fn ask(&self, request: &JudgeRequest) -> Result<String, EscalationError>;
}

/// Judge backed by the Anthropic Messages API.
pub struct AnthropicJudge {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl AnthropicJudge {
    /// `api_url` is the service root, e.g. `https://api.anthropic.com`
    /// (no trailing slash needed).
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens: 500,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_url)
    }
}

#[async_trait]
impl Judge for AnthropicJudge {
    fn name(&self) -> &str {
        &self.model
    }

    async fn ask(&self, request: &JudgeRequest) -> Result<String, EscalationError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            system: request.system_prompt(),
            messages: vec![Message {
                role: "user",
                content: request.user_prompt(),
            }],
        };

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EscalationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .ok_or(EscalationError::EmptyResponse)
    }
}

// ── Adapter ──

/// Wraps a [`Judge`] with a timeout and the fail-safe policy.
pub struct Escalator {
    judge: Box<dyn Judge>,
    timeout: Duration,
}

impl Escalator {
    pub fn new(judge: Box<dyn Judge>) -> Self {
        Self {
            judge,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    /// Ask the judge and return its verdict, or the error that prevented one.
    pub async fn try_escalate(&self, request: &JudgeRequest) -> Result<Judgement, EscalationError> {
        let raw = tokio::time::timeout(self.timeout, self.judge.ask(request))
            .await
            .map_err(|_| EscalationError::Timeout(self.timeout))??;
        debug!(judge = self.judge.name(), chars = raw.len(), "judge answered");
        parse_judgement(&raw)
    }

    /// Escalate a pair. Never fails: any error becomes "not a duplicate" with
    /// zero confidence.
    pub async fn escalate(
        &self,
        text_a: &str,
        text_b: &str,
        context_a: Option<String>,
        context_b: Option<String>,
    ) -> Verdict {
        let sim = similarity(&text_a.to_lowercase(), &text_b.to_lowercase());
        let request = JudgeRequest::new(text_a, text_b).with_context(context_a, context_b);

        match self.try_escalate(&request).await {
            Ok(judgement) => {
                info!(
                    judge = self.judge.name(),
                    is_duplicate = judgement.is_duplicate,
                    confidence = judgement.confidence,
                    "escalation settled"
                );
                judgement.into_verdict(sim)
            }
            Err(e) => {
                warn!(judge = self.judge.name(), error = %e, "escalation failed, keeping both");
                Verdict::distinct(Method::Escalated, format!("escalation failed: {e}"), sim)
            }
        }
    }
}

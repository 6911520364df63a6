use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::prompt::{analysis_prompt, summarization_prompt, PromptKind};
use crate::config::Config;
use crate::domain::LlmUsage;
use crate::error::AppError;
use crate::store::LlmCache;

const PROMPT_VERSION: &str = "v1";
/// Models known to honor OpenAI-style `response_format: json_object`.
const JSON_FORMAT_ALLOWLIST: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"];

/// spec.md §4.9: usage cost uses a per-model price table, not a flat
/// rate. `(prompt_rate_per_1k, completion_rate_per_1k)` in USD. Unknown
/// models fall back to the `gpt-4o-mini` row rather than erroring.
const MODEL_RATE_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4.1", 0.002, 0.008),
    ("gpt-4.1-mini", 0.0004, 0.0016),
];
const DEFAULT_RATE: (f64, f64) = (0.00015, 0.0006);

fn rate_for_model(model: &str) -> (f64, f64) {
    MODEL_RATE_TABLE
        .iter()
        .find(|(id, _, _)| *id == model)
        .map(|(_, prompt, completion)| (*prompt, *completion))
        .unwrap_or(DEFAULT_RATE)
}

#[derive(Debug, Clone)]
pub struct LlmOutcome {
    pub parsed: Value,
    pub usage: Option<LlmUsage>,
    pub from_cache: bool,
}

pub struct LlmClient {
    http: Client,
    cache: Arc<LlmCache>,
    api_base: String,
    api_key: Option<String>,
    fallback_model: String,
    repair_model: String,
    max_tokens: u32,
    inflight: DashMap<String, Arc<OnceCell<(Value, Option<LlmUsage>)>>>,
}

impl LlmClient {
    pub fn new(cfg: &Config, cache: Arc<LlmCache>) -> Self {
        Self {
            http: Client::new(),
            cache,
            api_base: cfg.llm_api_base.clone(),
            api_key: cfg.llm_api_key.clone(),
            fallback_model: cfg.llm_fallback_model.clone(),
            repair_model: cfg.llm_repair_model.clone(),
            max_tokens: 2000,
            inflight: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// spec.md §4.9: `hash = SHA-256(JSON({payload, prompt_version, model}))`.
    pub fn payload_hash(payload: &Value, model: &str) -> String {
        let envelope = serde_json::json!({"payload": payload, "prompt_version": PROMPT_VERSION, "model": model});
        let bytes = serde_json::to_vec(&envelope).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }

    /// Final investment analysis call. Structured JSON out, guarded by
    /// cache + in-flight collapse + a three-stage parse fallback.
    pub async fn analyze(&self, payload: &Value, model: &str) -> Result<LlmOutcome, AppError> {
        let hash = Self::payload_hash(payload, model);

        if let Some(cached) = self.cache.get(&hash).map_err(AppError::Storage)? {
            return Ok(LlmOutcome { parsed: cached, usage: None, from_cache: true });
        }

        let cell = self
            .inflight
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let (system, user) = analysis_prompt(payload);
        let model = model.to_string();
        let seed = Self::seed_from_hash(&hash);

        let result = cell
            .get_or_try_init(|| async {
                let output = self.call_with_fallback(&system, &user, &model, seed).await?;
                let parsed = self.parse_with_fallbacks(&output.content, &model).await?;
                validate_analysis(&parsed)?;
                let usage = usage_from_counts(&model, output.prompt_tokens, output.completion_tokens);
                self.cache.put(&hash, &parsed).map_err(AppError::Storage)?;
                Ok::<_, AppError>((parsed, usage))
            })
            .await
            .map(|v| v.clone());

        self.inflight.remove(&hash);
        let (parsed, usage) = result?;
        Ok(LlmOutcome { parsed, usage, from_cache: false })
    }

    /// Summarization family: MD&A, transcripts, news sentiment, keyword
    /// extraction. Uses the fallback model directly (spec.md §4.9).
    pub async fn summarize(&self, kind: PromptKind, input_text: &str) -> Result<Value, AppError> {
        let (system, user) = summarization_prompt(kind, input_text);
        let output = self.call_with_fallback(&system, &user, &self.fallback_model.clone(), None).await?;
        self.parse_with_fallbacks(&output.content, &self.fallback_model.clone()).await
    }

    async fn call_with_fallback(&self, system: &str, user: &str, model: &str, seed: Option<u64>) -> Result<ChatOutput, AppError> {
        match self.chat_completion(system, user, model, seed).await {
            Ok(output) => Ok(output),
            Err(_) if model != self.fallback_model => {
                warn!(model, fallback = %self.fallback_model, "llm call failed, retrying with fallback model");
                self.chat_completion(system, user, &self.fallback_model, None).await
            }
            Err(err) => Err(err),
        }
    }

    async fn chat_completion(&self, system: &str, user: &str, model: &str, seed: Option<u64>) -> Result<ChatOutput, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| AppError::LlmInvalid("LLM_API_KEY not configured".to_string()))?;

        let req = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: user.to_string() },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
            seed: seed.filter(|_| JSON_FORMAT_ALLOWLIST.contains(&model)),
            response_format: JSON_FORMAT_ALLOWLIST.contains(&model).then(|| ResponseFormat { format_type: "json_object".to_string() }),
        };

        debug!(model, "calling llm chat completion");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .timeout(Duration::from_secs(60))
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await
            .map_err(|err| AppError::classify_upstream(err.status().map(|s| s.as_u16()), &err.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::classify_upstream(Some(status.as_u16()), &body));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|err| AppError::UpstreamFatal(format!("llm response parse error: {err}")))?;
        let content = parsed.choices.into_iter().next().and_then(|c| c.message).map(|m| m.content).unwrap_or_default();

        Ok(ChatOutput {
            content,
            prompt_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }

    /// spec.md §4.9: `JSON.parse` on cleaned text → substring from first
    /// `{` to last `}` → delegated JSON repair via the repair model.
    async fn parse_with_fallbacks(&self, raw: &str, calling_model: &str) -> Result<Value, AppError> {
        let cleaned = raw.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim();
        if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
            return Ok(value);
        }

        if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
            if end > start {
                if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                    return Ok(value);
                }
            }
        }

        warn!(calling_model, "llm output failed direct parse, delegating to repair model");
        let repair_system = "你是一個 JSON 修復助手。請將以下內容修正為合法的 JSON，不得新增不存在的欄位。";
        let output = self.chat_completion(repair_system, cleaned, &self.repair_model, None).await?;
        serde_json::from_str(output.content.trim()).map_err(|err| AppError::LlmInvalid(format!("unrepairable llm output: {err}")))
    }

    fn seed_from_hash(hash: &str) -> Option<u64> {
        u64::from_str_radix(&hash[..12], 16).ok().map(|v| v % 1_000_000_000)
    }
}

fn validate_analysis(parsed: &Value) -> Result<(), AppError> {
    let rating = parsed.pointer("/action/rating").and_then(Value::as_str);
    match rating {
        Some(r) if !r.is_empty() && r != "N/A" => Ok(()),
        _ => Err(AppError::LlmInvalid("invalid-output: missing or N/A rating".to_string())),
    }
}

fn usage_from_counts(model: &str, prompt_tokens: Option<u64>, completion_tokens: Option<u64>) -> Option<LlmUsage> {
    let prompt_tokens = prompt_tokens?;
    let completion_tokens = completion_tokens.unwrap_or(0);
    let (prompt_rate, completion_rate) = rate_for_model(model);
    let input_cost = (prompt_tokens as f64 / 1000.0) * prompt_rate;
    let output_cost = (completion_tokens as f64 / 1000.0) * completion_rate;
    Some(LlmUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    })
}

struct ChatOutput {
    content: String,
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "response_format")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

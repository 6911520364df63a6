use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AnalystSignals, FilingSummary, Guardrails, InstitutionalSnapshot, MomentumMetrics, NewsFragment,
    PriceMeta, RequestKey,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Free-form validated shape returned by the LLM; see `llm` module for
/// the validation step that runs immediately on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub action: serde_json::Value,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisOutput {
    pub fn rating(&self) -> Option<&str> {
        self.action.get("rating").and_then(|v| v.as_str())
    }

    pub fn target_price(&self) -> Option<f64> {
        self.action.get("target_price").and_then(|v| v.as_f64())
    }

    pub fn confidence(&self) -> Option<&str> {
        self.action.get("confidence").and_then(|v| v.as_str())
    }

    pub fn set_target_price(&mut self, value: f64) {
        if let Some(obj) = self.action.as_object_mut() {
            obj.insert("target_price".to_string(), serde_json::json!(value));
        }
    }

    pub fn set_guardrail_note(&mut self, note: &str) {
        if let Some(obj) = self.action.as_object_mut() {
            obj.insert("guardrail_note".to_string(), serde_json::json!(note));
            let rationale = obj
                .get("rationale")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            obj.insert(
                "rationale".to_string(),
                serde_json::json!(format!("{rationale} {note}").trim()),
            );
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleInput {
    pub ticker: String,
    pub date: NaiveDate,
}

/// Top-level persisted result (spec.md §3). Persisted atomically by the
/// results store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub input: BundleInput,
    pub fetched_filings: Vec<FilingSummary>,
    pub fetched_price_meta: PriceMeta,
    pub analysis: Option<AnalysisOutput>,
    pub llm_usage: Option<LlmUsage>,
    pub analysis_model: String,
    pub news: Option<NewsFragment>,
    pub momentum: Option<MomentumMetrics>,
    pub institutional: Option<InstitutionalSnapshot>,
    pub earnings_call: Option<serde_json::Value>,
    pub analyst_signals: Option<AnalystSignals>,
    pub per_filing_summaries: Vec<FilingSummary>,
    pub analyst_metrics: Option<serde_json::Value>,
    pub macro_context: Option<serde_json::Value>,
    pub inputs: serde_json::Value,
    pub guardrails: Guardrails,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisBundle {
    pub fn request_key(&self, model_variant: &str) -> RequestKey {
        RequestKey::new(&self.input.ticker, self.input.date, model_variant)
    }
}

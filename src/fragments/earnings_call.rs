//! 4.6.7 Earnings Call Builder: baseline-quarter transcript plus the
//! prior quarter, each LLM-summarized into `{summary, bullets[]}`.
//! Missing quarters are cached as an empty sentinel so repeated
//! requests don't keep refetching a transcript that doesn't exist.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::adapters::transcripts::RawTranscript;
use crate::cache::KvCache;
use crate::llm::PromptKind;
use crate::state::AppState;

const MAX_PROMPT_CHARS: usize = 6000;

pub async fn build(state: &AppState, ticker: &str, baseline_date: NaiveDate) -> Option<serde_json::Value> {
    let latest = summarize_quarter(state, ticker, baseline_date).await;
    let prior = match &latest {
        Some(summary) => {
            let prior_cutoff = summary
                .get("date")
                .and_then(|v| v.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(|d| d - Duration::days(1))
                .unwrap_or(baseline_date);
            summarize_quarter(state, ticker, prior_cutoff).await
        }
        None => None,
    };

    if latest.is_none() && prior.is_none() {
        return None;
    }
    Some(serde_json::json!({"latest": latest, "prior": prior}))
}

async fn summarize_quarter(state: &AppState, ticker: &str, cutoff: NaiveDate) -> Option<serde_json::Value> {
    let kv_key = format!("earnings_call_{ticker}_{cutoff}");
    let ttl = chrono::Duration::days(state.config.earnings_call_ttl_days);
    if let Some(cached) = state.kv_cache.read::<serde_json::Value>(&kv_key, ttl) {
        return if KvCache::is_empty_sentinel(&cached) { None } else { Some(cached) };
    }

    let transcript = match state.adapters.transcripts.most_recent_before(ticker, cutoff).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            if let Err(err) = state.kv_cache.write_empty(&kv_key) {
                warn!(%err, ticker, "failed to persist earnings call empty sentinel");
            }
            return None;
        }
        Err(err) => {
            warn!(%err, ticker, "transcript fetch failed");
            return None;
        }
    };

    let summary = summarize_transcript(state, &transcript).await;
    if let Err(err) = state.kv_cache.write(&kv_key, &summary) {
        warn!(%err, ticker, "failed to persist earnings call summary");
    }
    Some(summary)
}

async fn summarize_transcript(state: &AppState, transcript: &RawTranscript) -> serde_json::Value {
    let base = serde_json::json!({
        "date": transcript.date,
        "quarter": transcript.quarter,
        "year": transcript.year,
    });

    if !state.llm_client.is_enabled() {
        let excerpt: String = transcript.content.chars().take(MAX_PROMPT_CHARS).collect();
        return merge(base, serde_json::json!({"summary": excerpt, "bullets": []}));
    }

    let excerpt: String = transcript.content.chars().take(MAX_PROMPT_CHARS).collect();
    match state.llm_client.summarize(PromptKind::TranscriptSummary, &excerpt).await {
        Ok(parsed) => {
            let summary = parsed.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let bullets = parsed.get("bullets").cloned().unwrap_or_else(|| serde_json::json!([]));
            merge(base, serde_json::json!({"summary": summary, "bullets": bullets}))
        }
        Err(err) => {
            warn!(%err, "llm transcript summarization failed");
            merge(base, serde_json::json!({"summary": excerpt, "bullets": []}))
        }
    }
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_combines_fields() {
        let base = serde_json::json!({"quarter": 1});
        let extra = serde_json::json!({"summary": "ok"});
        let merged = merge(base, extra);
        assert_eq!(merged["quarter"], 1);
        assert_eq!(merged["summary"], "ok");
    }
}

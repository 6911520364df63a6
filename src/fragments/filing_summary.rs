//! 4.6.1 Filing Summary Builder.

use chrono::Duration;
use tracing::warn;

use crate::domain::{FilingDescriptor, FilingSummary, SummaryKind};
use crate::llm::PromptKind;
use crate::state::AppState;

/// Caps the MD&A text sent to the LLM; the full text is still used for
/// the fallback excerpt.
const MAX_PROMPT_CHARS: usize = 6000;

pub async fn build(state: &AppState, ticker: &str, descriptor: &FilingDescriptor, existing: Option<&FilingSummary>) -> FilingSummary {
    if let Some(existing) = existing {
        if existing.summary_kind == SummaryKind::Llm || !state.llm_client.is_enabled() {
            return existing.clone();
        }
    }

    let kv_key = format!("filing_summary_{ticker}_{}_{}", descriptor.form, descriptor.filing_date);
    let ttl = Duration::days(state.config.filing_summary_ttl_days);
    if let Some(cached) = state.kv_cache.read::<FilingSummary>(&kv_key, ttl) {
        return cached;
    }

    let summary = fetch_and_summarize(state, descriptor).await;
    if let Err(err) = state.kv_cache.write(&kv_key, &summary) {
        warn!(%err, ticker, "failed to persist filing summary to kv cache");
    }
    summary
}

async fn fetch_and_summarize(state: &AppState, descriptor: &FilingDescriptor) -> FilingSummary {
    let text = match state.adapters.filings.fetch_document_text(&descriptor.url).await {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, url = %descriptor.url, "filing document fetch failed");
            return FilingSummary::fallback(&descriptor.form, descriptor.filing_date, descriptor.report_date, "");
        }
    };

    if !state.llm_client.is_enabled() {
        return FilingSummary::fallback(&descriptor.form, descriptor.filing_date, descriptor.report_date, &text);
    }

    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    match state.llm_client.summarize(PromptKind::FilingSummary, &excerpt).await {
        Ok(parsed) => {
            let summary_text = parsed.get("summary").and_then(|v| v.as_str()).unwrap_or_default();
            if summary_text.trim().is_empty() {
                FilingSummary::fallback(&descriptor.form, descriptor.filing_date, descriptor.report_date, &text)
            } else {
                FilingSummary::llm(&descriptor.form, descriptor.filing_date, descriptor.report_date, summary_text.to_string())
            }
        }
        Err(err) => {
            warn!(%err, "llm filing summarization failed, falling back to excerpt");
            FilingSummary::fallback(&descriptor.form, descriptor.filing_date, descriptor.report_date, &text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn existing_llm_summary_is_reused_without_refetch() {
        let existing = FilingSummary::llm("10-K", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), None, "cached summary".to_string());
        assert!(!existing.is_upgradeable());
    }
}

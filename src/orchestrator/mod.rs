//! C7: ties the fragment builders, caches, compactor, and LLM client
//! together into the request mode machine (spec.md §4.7).

pub mod modes;

use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::compactor::{apply_guardrails, compact_payload};
use crate::domain::{
    AnalysisBundle, AnalysisOutput, BundleInput, FilingSummary, Guardrails, RequestKey,
};
use crate::error::AppError;
use crate::fragments::{analyst_signals, earnings_call, filing_summary, institutional, macro_context, momentum, news, price_meta};
use crate::state::AppState;

use modes::Mode;

const PER_FILING_FANOUT: usize = 3;

pub struct AnalyzeRequest {
    pub ticker: String,
    pub baseline_date: NaiveDate,
    pub model: String,
    pub mode: Mode,
}

/// spec.md §4.7, steps 1-9.
pub async fn analyze(state: &AppState, request: AnalyzeRequest) -> Result<AnalysisBundle, AppError> {
    let ticker = validate_ticker(&request.ticker)?;
    let today = Utc::now().date_naive();
    let is_historical = request.baseline_date < today;
    let ttl = if is_historical { state.config.historical_ttl() } else { state.config.realtime_ttl() };

    let variant = format!("{}{}", request.model, request.mode.variant_suffix());
    let key = RequestKey::new(&ticker, request.baseline_date, variant.clone());

    let lock = state
        .assembly_locks
        .entry(key.storage_key())
        .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    let mut stored = state.results_store.get(&key).map_err(AppError::Storage)?;
    if stored.is_none() && request.mode.calls_llm_synchronously() {
        let metrics_key = RequestKey::new(&ticker, request.baseline_date, format!("{}__metrics", request.model));
        stored = state.results_store.get(&metrics_key).map_err(AppError::Storage)?;
    }

    if request.mode == Mode::CachedOnly {
        return match &stored {
            Some((bundle, updated_at)) if Utc::now().signed_duration_since(*updated_at) <= ttl => Ok(bundle.clone()),
            _ => Err(AppError::CacheMiss),
        };
    }

    let previous_filings = stored.as_ref().map(|(b, _)| b.per_filing_summaries.clone()).unwrap_or_default();

    let (price_meta, filings, momentum_metrics, analyst, institutional_snapshot, news_fragment, earnings, macro_ctx) = tokio::join!(
        price_meta::build(state, &ticker, request.baseline_date, today),
        build_filings(state, &ticker, request.baseline_date, &previous_filings),
        momentum::build(state, &ticker, request.baseline_date),
        analyst_signals::build(state, &ticker, request.baseline_date, today),
        institutional::build(state, &ticker, request.baseline_date),
        news::build(state, &ticker, request.baseline_date),
        earnings_call::build(state, &ticker, request.baseline_date),
        macro_context::build(state, request.baseline_date),
    );

    let guardrails = Guardrails::derive(
        momentum_metrics.as_ref().map(|m| m.score).unwrap_or(50.0),
        institutional_snapshot
            .as_ref()
            .map(|s| s.label.localized_label())
            .unwrap_or("持平"),
        state.config.momentum_severe_threshold,
    );

    let payload = assemble_payload(&ticker, request.baseline_date, &price_meta, &filings, &momentum_metrics, &analyst, &institutional_snapshot, &news_fragment, &earnings, &macro_ctx);
    let compact = compact_payload(&payload);

    let mut bundle = AnalysisBundle {
        input: BundleInput { ticker: ticker.clone(), date: request.baseline_date },
        fetched_filings: filings.clone(),
        fetched_price_meta: price_meta,
        analysis: stored.as_ref().and_then(|(b, _)| b.analysis.clone()),
        llm_usage: stored.as_ref().and_then(|(b, _)| b.llm_usage.clone()),
        analysis_model: request.model.clone(),
        news: Some(news_fragment),
        momentum: momentum_metrics,
        institutional: institutional_snapshot,
        earnings_call: earnings,
        analyst_signals: Some(analyst.clone()),
        per_filing_summaries: filings,
        analyst_metrics: Some(serde_json::to_value(&analyst).unwrap_or(serde_json::Value::Null)),
        macro_context: macro_ctx,
        inputs: compact.clone(),
        guardrails,
        updated_at: Utc::now(),
    };

    if !request.mode.calls_llm_synchronously() {
        state.results_store.put(&key, &bundle).map_err(AppError::Storage)?;
        if request.mode.enqueues_background_full_rerun() {
            enqueue_full_rerun(state, &ticker, request.baseline_date, request.model.clone());
        }
        return Ok(bundle);
    }

    let model = request.model.clone();
    let outcome = state.llm_client.analyze(&compact, &model).await?;
    let mut analysis: AnalysisOutput =
        serde_json::from_value(outcome.parsed).map_err(|err| AppError::LlmInvalid(format!("malformed analysis shape: {err}")))?;

    apply_guardrails(&state.config, &mut analysis, bundle.guardrails, bundle.fetched_price_meta.value);

    bundle.analysis = Some(analysis);
    bundle.llm_usage = outcome.usage.clone();
    if let Some(usage) = &outcome.usage {
        state.usage_monitor.record_cost(usage.total_cost);
    }

    state.results_store.put(&key, &bundle).map_err(AppError::Storage)?;
    info!(ticker = %bundle.input.ticker, variant = %variant, "analysis bundle assembled");
    Ok(bundle)
}

fn validate_ticker(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 10 || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return Err(AppError::Validation(format!("invalid ticker: {raw}")));
    }
    Ok(trimmed.to_ascii_uppercase())
}

async fn build_filings(
    state: &AppState,
    ticker: &str,
    baseline_date: NaiveDate,
    previous: &[FilingSummary],
) -> Vec<FilingSummary> {
    let limits = state.usage_monitor.adaptive_limits(state.config.max_filings_for_llm, state.config.news_article_limit);
    let descriptors = match state.adapters.filings.recent_filings(ticker, baseline_date, limits.max_filings.max(1)).await {
        Ok(descriptors) => descriptors,
        Err(err) => {
            warn!(%err, ticker, "recent filings fetch failed");
            return Vec::new();
        }
    };

    stream::iter(descriptors.into_iter().map(|descriptor| {
        let existing = previous
            .iter()
            .find(|f| f.form == descriptor.form && f.filing_date == descriptor.filing_date)
            .cloned();
        async move { filing_summary::build(state, ticker, &descriptor, existing.as_ref()).await }
    }))
    .buffer_unordered(PER_FILING_FANOUT)
    .collect::<Vec<_>>()
    .await
}

fn enqueue_full_rerun(state: &AppState, ticker: &str, baseline_date: NaiveDate, model: String) {
    let state = state.clone();
    let ticker = ticker.to_string();
    state.deferred_queue.enqueue(async move {
        let request = AnalyzeRequest { ticker, baseline_date, model, mode: Mode::Full };
        analyze(&state, request).await.map(|_| ()).map_err(|err| anyhow::anyhow!(err.to_string()))
    });
}

#[allow(clippy::too_many_arguments)]
fn assemble_payload(
    ticker: &str,
    baseline_date: NaiveDate,
    price_meta: &crate::domain::PriceMeta,
    filings: &[FilingSummary],
    momentum_metrics: &Option<crate::domain::MomentumMetrics>,
    analyst: &crate::domain::AnalystSignals,
    institutional_snapshot: &Option<crate::domain::InstitutionalSnapshot>,
    news_fragment: &crate::domain::NewsFragment,
    earnings: &Option<serde_json::Value>,
    macro_ctx: &Option<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "ticker": ticker,
        "baseline_date": baseline_date,
        "price": serde_json::to_value(price_meta).unwrap_or(serde_json::Value::Null),
        "filings": serde_json::to_value(filings).unwrap_or(serde_json::Value::Null),
        "momentum": serde_json::to_value(momentum_metrics).unwrap_or(serde_json::Value::Null),
        "analyst_signals": serde_json::to_value(analyst).unwrap_or(serde_json::Value::Null),
        "institutional": serde_json::to_value(institutional_snapshot).unwrap_or(serde_json::Value::Null),
        "news": serde_json::to_value(news_fragment).unwrap_or(serde_json::Value::Null),
        "earnings_call": earnings,
        "macro": macro_ctx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ticker() {
        assert!(validate_ticker("").is_err());
    }

    #[test]
    fn rejects_overlong_ticker() {
        assert!(validate_ticker("THISISWAYTOOLONG").is_err());
    }

    #[test]
    fn uppercases_valid_ticker() {
        assert_eq!(validate_ticker(" aapl ").unwrap(), "AAPL");
    }
}

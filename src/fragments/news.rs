//! 4.6.6 News Builder: keyword generation, parallel FMP/Finnhub fetch,
//! dedup/rank, LLM sentiment pass.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::domain::{NewsFragment, NewsSentiment};
use crate::llm::PromptKind;
use crate::state::AppState;

pub async fn build(state: &AppState, ticker: &str, baseline_date: NaiveDate) -> NewsFragment {
    let kv_key = format!("news_{ticker}_{baseline_date}");
    let ttl = Duration::hours(state.config.news_cache_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<NewsFragment>(&kv_key, ttl) {
        return cached;
    }

    let keywords = build_keywords(state, ticker).await;

    let limit = state.config.news_article_limit;
    let from = (baseline_date - Duration::days(14)).to_string();
    let to = baseline_date.to_string();

    let (fmp_articles, finnhub_articles) = tokio::join!(
        state.adapters.news.fmp_news(ticker, limit * 2),
        state.adapters.news.finnhub_news(ticker, &from, &to),
    );

    let mut articles = fmp_articles.unwrap_or_default();
    articles.extend(finnhub_articles.unwrap_or_default());
    // spec.md §4.6.6: filter to articles whose symbol/ticker set
    // actually contains the target, then dedup/rank the remainder.
    articles.retain(|article| article.mentions(ticker));
    let articles = NewsFragment::dedup_and_rank(articles, limit);

    let (sentiment_label, summary, supporting_events) = build_sentiment(state, ticker, &articles).await;

    let fragment = NewsFragment {
        keywords,
        articles,
        sentiment_label,
        summary,
        supporting_events,
    };

    if let Err(err) = state.kv_cache.write(&kv_key, &fragment) {
        warn!(%err, ticker, "failed to persist news fragment");
    }
    fragment
}

async fn build_keywords(state: &AppState, ticker: &str) -> Vec<String> {
    if !state.llm_client.is_enabled() {
        return NewsFragment::fallback_keywords(ticker);
    }
    match state.llm_client.summarize(PromptKind::NewsKeywords, ticker).await {
        Ok(parsed) => parsed
            .get("keywords")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
            .filter(|kws| !kws.is_empty())
            .unwrap_or_else(|| NewsFragment::fallback_keywords(ticker)),
        Err(err) => {
            warn!(%err, ticker, "llm keyword generation failed, using fallback keywords");
            NewsFragment::fallback_keywords(ticker)
        }
    }
}

async fn build_sentiment(
    state: &AppState,
    ticker: &str,
    articles: &[crate::domain::NewsArticle],
) -> (NewsSentiment, String, Vec<String>) {
    if articles.is_empty() {
        return (NewsSentiment::Neutral, "No recent coverage found.".to_string(), Vec::new());
    }
    if !state.llm_client.is_enabled() {
        return (
            NewsSentiment::Neutral,
            format!("{} articles collected; sentiment not computed.", articles.len()),
            Vec::new(),
        );
    }

    let headlines: String = articles.iter().map(|a| format!("- {}\n", a.title)).collect();
    match state.llm_client.summarize(PromptKind::NewsSentiment, &headlines).await {
        Ok(parsed) => {
            let sentiment = parsed
                .get("sentiment_label")
                .and_then(|v| v.as_str())
                .and_then(sentiment_from_label)
                .unwrap_or(NewsSentiment::Neutral);
            let summary = parsed.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let supporting_events = parsed
                .get("supporting_events")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            (sentiment, summary, supporting_events)
        }
        Err(err) => {
            warn!(%err, ticker, "llm sentiment pass failed");
            (NewsSentiment::Neutral, "Sentiment pass unavailable.".to_string(), Vec::new())
        }
    }
}

fn sentiment_from_label(label: &str) -> Option<NewsSentiment> {
    match label {
        "樂觀" | "bullish" | "positive" => Some(NewsSentiment::Bullish),
        "悲觀" | "bearish" | "negative" => Some(NewsSentiment::Bearish),
        "中性" | "neutral" => Some(NewsSentiment::Neutral),
        _ => None,
    }
}

//! C10: batch executor (spec.md §4.10). Accepts a parsed row list,
//! prefetches live quotes, and fans the rows out over a bounded worker
//! pool pulling from a shared index, memoizing by `(ticker, date,
//! model, mode)` so duplicate rows in one upload cost a single
//! orchestration run.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use calamine::{open_workbook_from_rs, Reader, Xlsx};
use chrono::NaiveDate;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

use crate::orchestrator::modes::Mode;
use crate::orchestrator::{self, AnalyzeRequest};
use crate::state::AppState;

const PREFETCH_CHUNK: usize = 50;

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResultRow {
    pub ticker: String,
    pub date: String,
    pub model: String,
    pub current_price: f64,
    pub llm_target_price: Option<f64>,
    pub recommendation: String,
    pub segment: String,
    pub quality_score: Option<f64>,
    pub news_sentiment: String,
    pub momentum_score: Option<f64>,
    pub trend_flag: String,
    pub institutional_signal: String,
    pub price_target_mean: Option<f64>,
    pub price_target_confidence: String,
    pub ratings_trend: String,
    pub grades_consensus: String,
}

/// spec.md §6: `ticker, date, [model]` columns, comma-separated.
pub fn parse_csv(bytes: &[u8]) -> anyhow::Result<Vec<BatchRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(ticker) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else { continue };
        let Some(date) = record.get(1).map(str::trim) else { continue };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
        let model = record.get(2).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        rows.push(BatchRow { ticker: ticker.to_string(), date, model });
    }
    Ok(rows)
}

pub fn parse_xlsx(bytes: Vec<u8>) -> anyhow::Result<Vec<BatchRow>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = Vec::new();
    for row in range.rows().skip(1) {
        let Some(ticker) = row.first().map(|c| c.to_string()).filter(|s| !s.is_empty()) else { continue };
        let Some(date_cell) = row.get(1) else { continue };
        let date_str = date_cell.to_string();
        let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")?;
        let model = row.get(2).map(|c| c.to_string()).filter(|s| !s.is_empty());
        rows.push(BatchRow { ticker, date, model });
    }
    Ok(rows)
}

pub fn to_csv(rows: &[BatchResultRow]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(String::from_utf8(writer.into_inner()?)?)
}

/// spec.md §4.10 step 1: populate the Process Cache with one quote per
/// non-historical ticker before the worker pool starts, so every worker
/// hits `fh_quote_{ticker}` instead of refetching. The adapter exposes
/// only a single-symbol endpoint, so "batches of 50" becomes bounded
/// concurrent single fetches rather than one multi-symbol request.
async fn prefetch(state: &AppState, rows: &[BatchRow], today: NaiveDate) {
    let mut tickers: Vec<&str> = rows
        .iter()
        .filter(|row| row.date >= today)
        .map(|row| row.ticker.as_str())
        .collect();
    tickers.sort_unstable();
    tickers.dedup();

    for chunk in tickers.chunks(PREFETCH_CHUNK) {
        stream::iter(chunk.iter().map(|ticker| async move {
            let hot_key = format!("fh_quote_{ticker}");
            if state.process_cache.get(&hot_key).is_some() {
                return;
            }
            match state.adapters.quotes.fmp_live_quote(ticker).await {
                Ok(quote) => {
                    if let Ok(value) = serde_json::to_value(&quote) {
                        state.process_cache.set(hot_key, value);
                    }
                }
                Err(err) => warn!(%err, ticker, "batch prefetch quote failed"),
            }
        }))
        .buffer_unordered(PREFETCH_CHUNK)
        .collect::<Vec<_>>()
        .await;
    }
}

pub async fn run(state: &AppState, rows: Vec<BatchRow>, mode: Mode, model_override: Option<String>) -> Vec<BatchResultRow> {
    let today = chrono::Utc::now().date_naive();
    prefetch(state, &rows, today).await;

    let concurrency = mode.resolve_concurrency(state.config.batch_concurrency).max(1);
    let memo: Arc<DashMap<String, Arc<OnceCell<BatchResultRow>>>> = Arc::new(DashMap::new());
    let results: Arc<Mutex<Vec<Option<BatchResultRow>>>> = Arc::new(Mutex::new(vec![None; rows.len()]));
    let next_index = Arc::new(AtomicUsize::new(0));
    let rows = Arc::new(rows);

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let state = state.clone();
        let rows = rows.clone();
        let memo = memo.clone();
        let results = results.clone();
        let next_index = next_index.clone();
        let model_override = model_override.clone();

        workers.push(tokio::spawn(async move {
            loop {
                let idx = next_index.fetch_add(1, Ordering::SeqCst);
                if idx >= rows.len() {
                    break;
                }
                let row = &rows[idx];
                let model = model_override
                    .clone()
                    .or_else(|| row.model.clone())
                    .unwrap_or_else(|| state.config.llm_model.clone());
                let memo_key = format!("{}|{}|{}|{:?}", row.ticker, row.date, model, mode);

                let cell = memo.entry(memo_key).or_insert_with(|| Arc::new(OnceCell::new())).clone();
                let row_result = cell
                    .get_or_init(|| async { process_row(&state, row, &model, mode).await })
                    .await
                    .clone();

                results.lock().await[idx] = Some(row_result);
            }
        }));
    }
    for worker in workers {
        let _ = worker.await;
    }

    Arc::try_unwrap(results)
        .map(|mutex| mutex.into_inner())
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .collect()
}

async fn process_row(state: &AppState, row: &BatchRow, model: &str, mode: Mode) -> BatchResultRow {
    let request = AnalyzeRequest {
        ticker: row.ticker.clone(),
        baseline_date: row.date,
        model: model.to_string(),
        mode,
    };
    match orchestrator::analyze(state, request).await {
        Ok(bundle) => bundle_to_row(&row.ticker, row.date, model, &bundle),
        Err(err) => error_row(&row.ticker, row.date, model, &err.to_string()),
    }
}

fn bundle_to_row(ticker: &str, date: NaiveDate, model: &str, bundle: &crate::domain::AnalysisBundle) -> BatchResultRow {
    let current_price = bundle.fetched_price_meta.value;
    let recommendation = bundle
        .analysis
        .as_ref()
        .and_then(|a| a.rating())
        .map(str::to_string)
        .unwrap_or_else(|| "N/A".to_string());
    let llm_target_price = bundle.analysis.as_ref().and_then(|a| a.target_price());
    let segment = segment_for(bundle.fetched_price_meta.market_cap);
    let news_sentiment = bundle
        .news
        .as_ref()
        .map(|n| format!("{:?}", n.sentiment_label))
        .unwrap_or_else(|| "N/A".to_string());
    let momentum_score = bundle.momentum.as_ref().map(|m| m.score);
    let trend_flag = bundle.momentum.as_ref().map(|m| format!("{:?}", m.trend)).unwrap_or_else(|| "N/A".to_string());
    let institutional_signal = bundle.institutional.as_ref().map(|s| s.label.localized_label().to_string()).unwrap_or_else(|| "N/A".to_string());

    let price_target = bundle.analyst_signals.as_ref().and_then(|s| s.price_target_summary.as_ref());
    let price_target_mean = price_target.and_then(|p| p.target_mean);
    let price_target_confidence = price_target.map(|p| format!("{:?}", p.confidence)).unwrap_or_else(|| "N/A".to_string());
    let ratings_trend = bundle
        .analyst_signals
        .as_ref()
        .and_then(|s| s.ratings.as_ref())
        .map(|r| format!("{:?}", r.trend))
        .unwrap_or_else(|| "N/A".to_string());
    let grades_consensus = bundle
        .analyst_signals
        .as_ref()
        .and_then(|s| s.grades.as_ref())
        .and_then(|g| g.consensus.clone())
        .unwrap_or_else(|| "N/A".to_string());

    BatchResultRow {
        ticker: ticker.to_string(),
        date: date.to_string(),
        model: model.to_string(),
        current_price,
        llm_target_price,
        recommendation,
        segment,
        quality_score: momentum_score,
        news_sentiment,
        momentum_score,
        trend_flag,
        institutional_signal,
        price_target_mean,
        price_target_confidence,
        ratings_trend,
        grades_consensus,
    }
}

fn segment_for(market_cap: Option<f64>) -> String {
    match market_cap {
        Some(cap) if cap >= 10e9 => "large-cap".to_string(),
        Some(cap) if cap >= 2e9 => "mid-cap".to_string(),
        Some(_) => "small-cap".to_string(),
        None => "N/A".to_string(),
    }
}

fn error_row(ticker: &str, date: NaiveDate, model: &str, message: &str) -> BatchResultRow {
    BatchResultRow {
        ticker: ticker.to_string(),
        date: date.to_string(),
        model: model.to_string(),
        current_price: 0.0,
        llm_target_price: None,
        recommendation: format!("ERROR:{message}"),
        segment: "N/A".to_string(),
        quality_score: None,
        news_sentiment: "N/A".to_string(),
        momentum_score: None,
        trend_flag: "N/A".to_string(),
        institutional_signal: "N/A".to_string(),
        price_target_mean: None,
        price_target_confidence: "N/A".to_string(),
        ratings_trend: "N/A".to_string(),
        grades_consensus: "N/A".to_string(),
    }
}

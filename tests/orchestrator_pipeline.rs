//! End-to-end tests over the storage, compaction, and batch-output
//! seams without touching the network: the adapters hardcode vendor
//! base URLs, so these exercise every layer that sits between a
//! persisted/assembled bundle and what a caller actually receives.

use chrono::{NaiveDate, Utc};
use equity_research_orchestrator::batch::{self, BatchResultRow};
use equity_research_orchestrator::compactor::{apply_guardrails, compact_payload};
use equity_research_orchestrator::domain::{
    AnalysisBundle, AnalysisOutput, BundleInput, Guardrails, InstitutionalSignal,
    InstitutionalSnapshot, MomentumMetrics, MovingAverages, NewsFragment, NewsSentiment,
    PeriodReturns, PriceKind, PriceMeta, RequestKey, Trend,
};
use equity_research_orchestrator::orchestrator::modes::Mode;
use equity_research_orchestrator::store::ResultsStore;
use serde_json::json;

fn sample_bundle(ticker: &str, date: NaiveDate) -> AnalysisBundle {
    AnalysisBundle {
        input: BundleInput { ticker: ticker.to_string(), date },
        fetched_filings: Vec::new(),
        fetched_price_meta: PriceMeta {
            value: 182.5,
            as_of: Utc::now(),
            source: "real-time_fmp".to_string(),
            kind: PriceKind::RealTime,
            extended: false,
            year_high: Some(200.0),
            year_low: Some(150.0),
            ma50: Some(180.0),
            ma200: Some(170.0),
            intraday: Some(182.5),
            market_cap: Some(2.9e12),
        },
        analysis: Some(
            serde_json::from_value::<AnalysisOutput>(json!({
                "action": {"rating": "BUY", "target_price": 300.0, "confidence": "medium", "rationale": "strong momentum"}
            }))
            .unwrap(),
        ),
        llm_usage: None,
        analysis_model: "gpt-4o".to_string(),
        news: Some(NewsFragment {
            keywords: vec!["earnings".to_string()],
            articles: Vec::new(),
            sentiment_label: NewsSentiment::Bullish,
            summary: "positive coverage ahead of earnings".to_string(),
            supporting_events: vec!["earnings beat".to_string()],
        }),
        momentum: Some(MomentumMetrics {
            score: 82.0,
            trend: Trend::Strong,
            returns: PeriodReturns { m3: Some(0.12), m6: Some(0.2), m12: Some(0.3) },
            moving_averages: MovingAverages { sma20: Some(181.0), sma50: Some(180.0), sma200: Some(170.0) },
            rsi14: Some(65.0),
            atr14: Some(3.2),
            volume_ratio: Some(1.1),
            price_vs_ma: equity_research_orchestrator::domain::PriceVsMa { above_sma50: true, above_sma200: true },
            etf: None,
            reference_date: date,
        }),
        institutional: Some(InstitutionalSnapshot {
            as_of: Utc::now(),
            label: InstitutionalSignal::Accumulating,
            net_shares: 1_000_000.0,
            top_holders: Vec::new(),
            summary: "institutions accumulating".to_string(),
            metrics: json!({}),
            insider_activity: None,
            analyst_actions: None,
        }),
        earnings_call: None,
        analyst_signals: Some(equity_research_orchestrator::domain::AnalystSignals {
            price_target_summary: None,
            estimates: None,
            ratings: None,
            grades: None,
        }),
        per_filing_summaries: Vec::new(),
        analyst_metrics: None,
        macro_context: None,
        inputs: json!({"ticker": ticker}),
        guardrails: Guardrails::default(),
        updated_at: Utc::now(),
    }
}

#[test]
fn results_store_round_trips_and_clears_variants() {
    let store = ResultsStore::open_in_memory().unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let bundle = sample_bundle("NVDA", date);
    let key = RequestKey::new("NVDA", date, "gpt-4o__full".to_string());

    store.put(&key, &bundle).unwrap();
    let (fetched, _updated_at) = store.get(&key).unwrap().expect("bundle was just stored");
    assert_eq!(fetched.input.ticker, "NVDA");
    assert_eq!(fetched.analysis.unwrap().rating(), Some("BUY"));

    let cleared = store.clear_variants("NVDA", Some(date), "gpt-4o").unwrap();
    assert_eq!(cleared, 1);
    assert!(store.get(&key).unwrap().is_none());
}

#[test]
fn compaction_then_guardrails_clamp_high_target_under_severe_momentum() {
    let bundle = sample_bundle("AAPL", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    let payload = json!({
        "ticker": bundle.input.ticker,
        "momentum": equity_research_orchestrator::domain::MomentumMetrics::clamp_score(200.0),
        "mda_summary": "x".repeat(2000),
        "noise": "y".repeat(2000),
        "empty": {},
    });
    let compact = compact_payload(&payload);
    assert_eq!(compact["mda_summary"].as_str().unwrap().len(), 900);
    assert_eq!(compact["noise"].as_str().unwrap().len(), 300);
    assert!(compact.get("empty").is_none());

    let mut analysis = bundle.analysis.unwrap();
    let config = test_config();
    let guardrails = Guardrails { severe_momentum: true, selling_pressure: false };
    apply_guardrails(&config, &mut analysis, guardrails, 182.5);
    let clamped = analysis.target_price().unwrap();
    assert!(clamped <= 182.5 * config.weak_signal_target_cap + 1e-9);
}

#[tokio::test]
async fn batch_csv_round_trip_produces_one_row_per_input_with_error_rows_preserved() {
    let rows = vec![
        error_row("NVDA"),
        error_row("MSFT"),
    ];
    let csv = batch::to_csv(&rows).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3); // header + 2 rows
    assert!(lines[1].contains("ERROR:"));
}

#[test]
fn mode_resolve_concurrency_matches_spec_table() {
    assert_eq!(Mode::Full.resolve_concurrency(3), 3);
    assert_eq!(Mode::MetricsOnly.resolve_concurrency(3), 2);
    assert_eq!(Mode::CachedOnly.resolve_concurrency(3), 1);
    assert_eq!(Mode::Deferred.resolve_concurrency(3), 3);
}

fn error_row(ticker: &str) -> BatchResultRow {
    BatchResultRow {
        ticker: ticker.to_string(),
        date: "2024-01-02".to_string(),
        model: "gpt-4o".to_string(),
        current_price: 0.0,
        llm_target_price: None,
        recommendation: "ERROR:upstream timeout".to_string(),
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

fn test_config() -> equity_research_orchestrator::config::Config {
    equity_research_orchestrator::config::Config {
        port: 0,
        kv_cache_dir: String::new(),
        results_db_path: String::new(),
        realtime_result_ttl_hours: 12,
        historical_result_ttl_days: 120,
        filing_summary_ttl_days: 180,
        news_cache_ttl_hours: 6,
        momentum_cache_ttl_hours: 6,
        thirteenf_ttl_days: 30,
        earnings_call_ttl_days: 30,
        analyst_aggregate_ttl_hours: 24,
        analyst_price_target_ttl_hours: 24,
        analyst_estimates_ttl_hours: 24,
        api_retry_attempts: 3,
        api_retry_delay_ms: 10,
        batch_concurrency: 3,
        max_filings_for_llm: 2,
        news_article_limit: 4,
        momentum_strong_threshold: 70.0,
        momentum_severe_threshold: 20.0,
        weak_signal_target_cap: 1.25,
        weak_signal_target_floor: 0.8,
        llm_target_max_multiplier: 1.8,
        llm_target_min_multiplier: 0.6,
        price_target_sample_threshold: 3,
        extended_window_days: 14,
        prewarm_tickers: vec![],
        prewarm_interval_hours: 6,
        prewarm_include_llm: false,
        llm_api_base: String::new(),
        llm_api_key: None,
        llm_model: String::new(),
        llm_fallback_model: String::new(),
        llm_repair_model: String::new(),
    }
}

//! Exercises `QuotesAdapter` against a mocked vendor host instead of the
//! real FMP/Yahoo endpoints, using the `FMP_BASE_URL`/`YAHOO_BASE_URL`
//! overrides the adapter reads at construction time.

use equity_research_orchestrator::adapters::quotes::QuotesAdapter;
use equity_research_orchestrator::config::Config;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config {
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
        api_retry_attempts: 1,
        api_retry_delay_ms: 1,
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

#[tokio::test]
async fn fmp_live_quote_parses_mocked_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"price": 191.25, "yearHigh": 199.62, "yearLow": 164.08, "priceAvg50": 188.0, "priceAvg200": 180.0, "marketCap": 2.95e12}
        ])))
        .mount(&server)
        .await;

    std::env::set_var("FMP_BASE_URL", server.uri());
    let adapter = QuotesAdapter::new(&test_config());
    let quote = adapter.fmp_live_quote("AAPL").await.unwrap();
    std::env::remove_var("FMP_BASE_URL");

    assert_eq!(quote.price, 191.25);
    assert_eq!(quote.market_cap, Some(2.95e12));
}

#[tokio::test]
async fn fmp_live_quote_propagates_upstream_failure_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote/ZZZZ"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    std::env::set_var("FMP_BASE_URL", server.uri());
    let adapter = QuotesAdapter::new(&test_config());
    let result = adapter.fmp_live_quote("ZZZZ").await;
    std::env::remove_var("FMP_BASE_URL");

    assert!(result.is_err());
}

#[tokio::test]
async fn yahoo_live_quote_parses_mocked_chart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MSFT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {"result": [{"meta": {"regularMarketPrice": 415.0, "fiftyTwoWeekHigh": 430.0, "fiftyTwoWeekLow": 300.0}}]}
        })))
        .mount(&server)
        .await;

    std::env::set_var("YAHOO_BASE_URL", server.uri());
    let adapter = QuotesAdapter::new(&test_config());
    let quote = adapter.yahoo_live_quote("MSFT").await.unwrap();
    std::env::remove_var("YAHOO_BASE_URL");

    assert_eq!(quote.price, 415.0);
    assert_eq!(quote.year_high, Some(430.0));
}

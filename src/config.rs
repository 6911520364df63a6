//! Runtime configuration, read from the environment (spec.md §6).
//!
//! Mirrors the teacher's `Config::from_env` convention: every variable
//! has a hard-coded default and parse failures fall back to it rather
//! than aborting startup.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub kv_cache_dir: String,
    pub results_db_path: String,

    pub realtime_result_ttl_hours: i64,
    pub historical_result_ttl_days: i64,
    pub filing_summary_ttl_days: i64,
    pub news_cache_ttl_hours: i64,
    pub momentum_cache_ttl_hours: i64,
    pub thirteenf_ttl_days: i64,
    pub earnings_call_ttl_days: i64,
    pub analyst_aggregate_ttl_hours: i64,
    pub analyst_price_target_ttl_hours: i64,
    pub analyst_estimates_ttl_hours: i64,

    pub api_retry_attempts: u32,
    pub api_retry_delay_ms: u64,

    pub batch_concurrency: usize,
    pub max_filings_for_llm: usize,
    pub news_article_limit: usize,

    pub momentum_strong_threshold: f64,
    pub momentum_severe_threshold: f64,
    pub weak_signal_target_cap: f64,
    pub weak_signal_target_floor: f64,
    pub llm_target_max_multiplier: f64,
    pub llm_target_min_multiplier: f64,
    pub price_target_sample_threshold: u32,

    pub extended_window_days: i64,

    pub prewarm_tickers: Vec<String>,
    pub prewarm_interval_hours: u64,
    pub prewarm_include_llm: bool,

    pub llm_api_base: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_fallback_model: String,
    pub llm_repair_model: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            port: env_or("PORT", 8080),
            kv_cache_dir: env::var("KV_CACHE_DIR").unwrap_or_else(|_| "./data/kv_cache".to_string()),
            results_db_path: env::var("RESULTS_DB_PATH").unwrap_or_else(|_| "./data/results.db".to_string()),

            realtime_result_ttl_hours: env_or("REALTIME_RESULT_TTL_HOURS", 12),
            historical_result_ttl_days: env_or("HISTORICAL_RESULT_TTL_DAYS", 120),
            filing_summary_ttl_days: env_or("FILING_SUMMARY_TTL_DAYS", 180),
            news_cache_ttl_hours: env_or("NEWS_CACHE_TTL_HOURS", 6),
            momentum_cache_ttl_hours: env_or("MOMENTUM_CACHE_TTL_HOURS", 6),
            thirteenf_ttl_days: env_or("THIRTEENF_TTL_DAYS", 30),
            earnings_call_ttl_days: env_or("EARNINGS_CALL_TTL_DAYS", 30),
            analyst_aggregate_ttl_hours: env_or("ANALYST_AGGREGATE_TTL_HOURS", 24),
            analyst_price_target_ttl_hours: env_or("ANALYST_PRICE_TARGET_TTL_HOURS", 24),
            analyst_estimates_ttl_hours: env_or("ANALYST_ESTIMATES_TTL_HOURS", 24),

            api_retry_attempts: env_or("API_RETRY_ATTEMPTS", 3),
            api_retry_delay_ms: env_or("API_RETRY_DELAY_MS", 1500),

            batch_concurrency: env_or("BATCH_CONCURRENCY", 3),
            max_filings_for_llm: env_or("MAX_FILINGS_FOR_LLM", 2),
            news_article_limit: env_or("NEWS_ARTICLE_LIMIT", 4),

            momentum_strong_threshold: env_or("MOMENTUM_STRONG_THRESHOLD", 70.0),
            momentum_severe_threshold: env_or("MOMENTUM_SEVERE_THRESHOLD", 20.0),
            weak_signal_target_cap: env_or("WEAK_SIGNAL_TARGET_CAP", 1.25),
            weak_signal_target_floor: env_or("WEAK_SIGNAL_TARGET_FLOOR", 0.8),
            llm_target_max_multiplier: env_or("LLM_TARGET_MAX_MULTIPLIER", 1.8),
            llm_target_min_multiplier: env_or("LLM_TARGET_MIN_MULTIPLIER", 0.6),
            price_target_sample_threshold: env_or("PRICE_TARGET_SAMPLE_THRESHOLD", 3),

            extended_window_days: env_or("EXTENDED_WINDOW_DAYS", 14),

            prewarm_tickers: env_list("PREWARM_TICKERS", ""),
            prewarm_interval_hours: env_or("PREWARM_INTERVAL_HOURS", 6),
            prewarm_include_llm: env_bool("PREWARM_INCLUDE_LLM", false),

            llm_api_base: env::var("LLM_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            llm_fallback_model: env::var("LLM_FALLBACK_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_repair_model: env::var("LLM_REPAIR_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        })
    }

    pub fn realtime_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.realtime_result_ttl_hours)
    }

    pub fn historical_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.historical_result_ttl_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // No env vars set (test runs in isolation): defaults from spec.md §6 apply.
        std::env::remove_var("API_RETRY_ATTEMPTS");
        std::env::remove_var("BATCH_CONCURRENCY");
        let cfg = Config {
            port: 8080,
            kv_cache_dir: String::new(),
            results_db_path: String::new(),
            realtime_result_ttl_hours: env_or("REALTIME_RESULT_TTL_HOURS_UNSET_TEST", 12),
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
            api_retry_delay_ms: 1500,
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
        };
        assert_eq!(cfg.api_retry_attempts, 3);
        assert_eq!(cfg.momentum_severe_threshold, 20.0);
    }
}

//! Analyst consensus: price targets, estimates, ratings, grades
//! (spec.md §4.5, §4.6.4).

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::{alias_f64, alias_str, get_json};
use crate::config::Config;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";

pub struct RawPriceTarget {
    pub target_mean: f64,
    pub target_high: Option<f64>,
    pub target_low: Option<f64>,
    pub publisher_count: u32,
}

pub struct RawRating {
    pub date: NaiveDate,
    pub score: f64,
}

pub struct RawGrade {
    pub date: NaiveDate,
    pub from_grade: String,
    pub to_grade: String,
    pub action: String,
}

pub struct AnalystAdapter {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl AnalystAdapter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("FMP_API_KEY").ok(),
            timeout: Duration::from_secs(20),
            attempts: cfg.api_retry_attempts,
            delay: Duration::from_millis(cfg.api_retry_delay_ms),
        }
    }

    fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or("demo")
    }

    pub async fn price_target_consensus(&self, ticker: &str) -> Result<RawPriceTarget, AppError> {
        let url = format!("{FMP_BASE}/price-target-consensus");
        let body = get_json(
            &self.client,
            &url,
            &[("symbol", ticker.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let row = body.get(0).cloned().unwrap_or(Value::Null);
        let target_mean = alias_f64(&row, &["targetConsensus", "targetMean", "targetAvg"])
            .ok_or_else(|| AppError::UpstreamFatal("missing price target consensus".to_string()))?;
        Ok(RawPriceTarget {
            target_mean,
            target_high: alias_f64(&row, &["targetHigh"]),
            target_low: alias_f64(&row, &["targetLow"]),
            publisher_count: alias_f64(&row, &["publishers", "publisherCount"]).unwrap_or(0.0) as u32,
        })
    }

    pub async fn estimates(&self, ticker: &str, period: &str) -> Result<Vec<Value>, AppError> {
        let url = format!("{FMP_BASE}/analyst-estimates/{ticker}");
        let body = get_json(
            &self.client,
            &url,
            &[("period", period.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    pub async fn ratings_history(&self, ticker: &str) -> Result<Vec<RawRating>, AppError> {
        let url = format!("{FMP_BASE}/historical-rating/{ticker}");
        let body = get_json(&self.client, &url, &[("apikey", self.api_key().to_string())], self.timeout, self.attempts, self.delay).await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(rating_from_row).collect())
    }

    pub async fn grades(&self, ticker: &str) -> Result<Vec<RawGrade>, AppError> {
        let url = format!("{FMP_BASE}/grade/{ticker}");
        let body = get_json(&self.client, &url, &[("apikey", self.api_key().to_string())], self.timeout, self.attempts, self.delay).await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(grade_from_row).collect())
    }
}

fn rating_from_row(row: &Value) -> Option<RawRating> {
    let date = alias_str(row, &["date"]).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
    let score = alias_f64(row, &["ratingScore", "score"])?;
    Some(RawRating { date, score })
}

fn grade_from_row(row: &Value) -> Option<RawGrade> {
    let date = alias_str(row, &["date"]).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
    let from_grade = alias_str(row, &["previousGrade", "fromGrade"]).unwrap_or("").to_string();
    let to_grade = alias_str(row, &["newGrade", "toGrade"]).unwrap_or("").to_string();
    let action = alias_str(row, &["action"]).unwrap_or("").to_string();
    Some(RawGrade { date, from_grade, to_grade, action })
}

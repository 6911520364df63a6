//! Pricing adapter: FMP + Yahoo, real-time and historical. Fallback
//! ordering across sources lives in `fragments::price_meta` (C6); this
//! module only exposes one canonical method per vendor call
//! (spec.md §4.5, §4.6.2).

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{alias_f64, get_json};
use crate::config::Config;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";
const YAHOO_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawQuote {
    pub price: f64,
    pub as_of: DateTime<Utc>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub intraday: Option<f64>,
    pub market_cap: Option<f64>,
}

pub struct QuotesAdapter {
    client: Client,
    api_key: Option<String>,
    fmp_base: String,
    yahoo_base: String,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl QuotesAdapter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("FMP_API_KEY").ok(),
            // Overridable so integration tests can point the adapter at a
            // wiremock server instead of the real vendor host.
            fmp_base: std::env::var("FMP_BASE_URL").unwrap_or_else(|_| FMP_BASE.to_string()),
            yahoo_base: std::env::var("YAHOO_BASE_URL").unwrap_or_else(|_| YAHOO_BASE.to_string()),
            timeout: Duration::from_secs(20),
            attempts: cfg.api_retry_attempts,
            delay: Duration::from_millis(cfg.api_retry_delay_ms),
        }
    }

    fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or("demo")
    }

    pub async fn fmp_live_quote(&self, ticker: &str) -> Result<RawQuote, AppError> {
        let url = format!("{}/quote/{ticker}", self.fmp_base);
        let body = get_json(&self.client, &url, &[("apikey", self.api_key().to_string())], self.timeout, self.attempts, self.delay).await?;
        let row = body.get(0).cloned().unwrap_or(Value::Null);
        quote_from_fmp_row(&row)
    }

    pub async fn fmp_historical(&self, ticker: &str, date: NaiveDate) -> Result<RawQuote, AppError> {
        let url = format!("{}/historical-price-full/{ticker}", self.fmp_base);
        let body = get_json(
            &self.client,
            &url,
            &[
                ("apikey", self.api_key().to_string()),
                ("from", date.to_string()),
                ("to", date.to_string()),
            ],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let historical = body.get("historical").and_then(Value::as_array).cloned().unwrap_or_default();
        let row = historical.first().ok_or_else(|| AppError::UpstreamFatal("no historical bar for date".to_string()))?;
        let price = alias_f64(row, &["close", "adjClose"])
            .ok_or_else(|| AppError::UpstreamFatal("missing close price".to_string()))?;
        Ok(RawQuote {
            price,
            as_of: date.and_hms_opt(16, 0, 0).unwrap().and_utc(),
            year_high: None,
            year_low: None,
            ma50: None,
            ma200: None,
            intraday: None,
            market_cap: None,
        })
    }

    /// Daily OHLCV bars for momentum computation (spec.md §4.6.3: at
    /// least 252 trading days), oldest first.
    pub async fn daily_bars(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyBar>, AppError> {
        let url = format!("{}/historical-price-full/{ticker}", self.fmp_base);
        let body = get_json(
            &self.client,
            &url,
            &[("apikey", self.api_key().to_string()), ("from", from.to_string()), ("to", to.to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let historical = body.get("historical").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut bars: Vec<DailyBar> = historical.iter().filter_map(bar_from_row).collect();
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    pub async fn yahoo_live_quote(&self, ticker: &str) -> Result<RawQuote, AppError> {
        let url = format!("{}/{ticker}", self.yahoo_base);
        let body = get_json(&self.client, &url, &[], self.timeout, self.attempts, self.delay).await?;
        quote_from_yahoo_chart(&body)
    }

    pub async fn yahoo_chart(&self, ticker: &str, date: NaiveDate) -> Result<RawQuote, AppError> {
        let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end = date.succ_opt().unwrap_or(date).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let url = format!("{}/{ticker}", self.yahoo_base);
        let body = get_json(
            &self.client,
            &url,
            &[("period1", start.to_string()), ("period2", end.to_string()), ("interval", "1d".to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        quote_from_yahoo_chart(&body)
    }
}

fn bar_from_row(row: &Value) -> Option<DailyBar> {
    let date = row.get("date").and_then(Value::as_str).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
    let close = alias_f64(row, &["close", "adjClose"])?;
    let volume = alias_f64(row, &["volume"]).unwrap_or(0.0);
    Some(DailyBar { date, close, volume })
}

fn quote_from_fmp_row(row: &Value) -> Result<RawQuote, AppError> {
    let price = alias_f64(row, &["price", "previousClose"])
        .ok_or_else(|| AppError::UpstreamFatal("missing price field".to_string()))?;
    Ok(RawQuote {
        price,
        as_of: Utc::now(),
        year_high: alias_f64(row, &["yearHigh"]),
        year_low: alias_f64(row, &["yearLow"]),
        ma50: alias_f64(row, &["priceAvg50"]),
        ma200: alias_f64(row, &["priceAvg200"]),
        intraday: alias_f64(row, &["price"]),
        market_cap: alias_f64(row, &["marketCap"]),
    })
}

fn quote_from_yahoo_chart(body: &Value) -> Result<RawQuote, AppError> {
    let result = body
        .pointer("/chart/result/0")
        .ok_or_else(|| AppError::UpstreamFatal("empty yahoo chart response".to_string()))?;
    let meta = result.get("meta").cloned().unwrap_or(Value::Null);
    let price = alias_f64(&meta, &["regularMarketPrice", "previousClose", "chartPreviousClose"])
        .ok_or_else(|| AppError::UpstreamFatal("missing yahoo price".to_string()))?;
    Ok(RawQuote {
        price,
        as_of: Utc::now(),
        year_high: alias_f64(&meta, &["fiftyTwoWeekHigh"]),
        year_low: alias_f64(&meta, &["fiftyTwoWeekLow"]),
        ma50: None,
        ma200: None,
        intraday: alias_f64(&meta, &["regularMarketPrice"]),
        market_cap: None,
    })
}

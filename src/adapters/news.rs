//! Company news: FMP stock-news plus Finnhub as a secondary source
//! feeding the same canonical article shape (spec.md §4.5, §4.6.6).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;

use super::{alias_f64, alias_str, get_json};
use crate::config::Config;
use crate::domain::NewsArticle;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";
const FINNHUB_BASE: &str = "https://finnhub.io/api/v1";

pub struct NewsAdapter {
    client: Client,
    fmp_key: Option<String>,
    finnhub_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl NewsAdapter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            fmp_key: std::env::var("FMP_API_KEY").ok(),
            finnhub_key: std::env::var("FINNHUB_API_KEY").ok(),
            timeout: Duration::from_secs(15),
            attempts: cfg.api_retry_attempts,
            delay: Duration::from_millis(cfg.api_retry_delay_ms),
        }
    }

    pub async fn fmp_news(&self, ticker: &str, limit: usize) -> Result<Vec<NewsArticle>, AppError> {
        let url = format!("{FMP_BASE}/stock_news");
        let body = get_json(
            &self.client,
            &url,
            &[
                ("tickers", ticker.to_string()),
                ("limit", limit.to_string()),
                ("apikey", self.fmp_key.clone().unwrap_or_else(|| "demo".to_string())),
            ],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(|row| article_from_fmp_row(row)).collect())
    }

    pub async fn finnhub_news(&self, ticker: &str, from: &str, to: &str) -> Result<Vec<NewsArticle>, AppError> {
        let Some(token) = self.finnhub_key.clone() else {
            return Ok(vec![]);
        };
        let url = format!("{FINNHUB_BASE}/company-news");
        let body = get_json(
            &self.client,
            &url,
            &[("symbol", ticker.to_string()), ("from", from.to_string()), ("to", to.to_string()), ("token", token)],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(article_from_finnhub_row).collect())
    }
}

/// Splits a vendor's comma-separated ticker field ("symbol": "AAPL" or
/// "related": "AAPL,MSFT,") into a trimmed, non-empty symbol list.
fn parse_symbols(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn article_from_fmp_row(row: &Value) -> Option<NewsArticle> {
    let title = alias_str(row, &["title"])?.to_string();
    let url = alias_str(row, &["url"])?.to_string();
    let source = alias_str(row, &["site", "source"]).unwrap_or("fmp").to_string();
    let published_at = alias_str(row, &["publishedDate"])
        .and_then(|s| DateTime::parse_from_str(&format!("{s} +0000"), "%Y-%m-%d %H:%M:%S %z").ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let symbols = parse_symbols(alias_str(row, &["symbol", "tickers"]));
    Some(NewsArticle { title, url, source, weight: 1.0, published_at, symbols })
}

fn article_from_finnhub_row(row: &Value) -> Option<NewsArticle> {
    let title = alias_str(row, &["headline"])?.to_string();
    let url = alias_str(row, &["url"])?.to_string();
    let source = alias_str(row, &["source"]).unwrap_or("finnhub").to_string();
    let epoch = alias_f64(row, &["datetime"]).unwrap_or(0.0) as i64;
    let published_at = DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now);
    let symbols = parse_symbols(alias_str(row, &["related"]));
    Some(NewsArticle { title, url, source, weight: 0.8, published_at, symbols })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fmp_article() {
        let row = json!({"title": "Earnings beat", "url": "https://x.com/a", "site": "Reuters", "publishedDate": "2024-03-01 09:00:00", "symbol": "AAPL"});
        let article = article_from_fmp_row(&row).unwrap();
        assert_eq!(article.source, "Reuters");
        assert_eq!(article.symbols, vec!["AAPL".to_string()]);
    }

    #[test]
    fn parses_finnhub_article() {
        let row = json!({"headline": "Guidance cut", "url": "https://x.com/b", "source": "Bloomberg", "datetime": 1_700_000_000, "related": "AAPL,MSFT,"});
        let article = article_from_finnhub_row(&row).unwrap();
        assert_eq!(article.weight, 0.8);
        assert_eq!(article.symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn missing_symbol_field_yields_empty_list() {
        let row = json!({"title": "x", "url": "https://x.com/c"});
        let article = article_from_fmp_row(&row).unwrap();
        assert!(article.symbols.is_empty());
    }
}

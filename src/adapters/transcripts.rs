//! Earnings call transcripts (spec.md §4.5, §4.6.7). Only the most
//! recent transcript on or before the baseline date is relevant; the
//! fragment builder excerpts it the same way filings excerpt MD&A.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::{alias_str, get_json};
use crate::config::Config;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";

pub struct RawTranscript {
    pub date: NaiveDate,
    pub quarter: u32,
    pub year: u32,
    pub content: String,
}

pub struct TranscriptsAdapter {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl TranscriptsAdapter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("FMP_API_KEY").ok(),
            timeout: Duration::from_secs(30),
            attempts: cfg.api_retry_attempts,
            delay: Duration::from_millis(cfg.api_retry_delay_ms),
        }
    }

    fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or("demo")
    }

    pub async fn most_recent_before(&self, ticker: &str, baseline_date: NaiveDate) -> Result<Option<RawTranscript>, AppError> {
        let url = format!("{FMP_BASE}/earning_call_transcript/{ticker}");
        let body = get_json(&self.client, &url, &[("apikey", self.api_key().to_string())], self.timeout, self.attempts, self.delay).await?;
        let rows = body.as_array().cloned().unwrap_or_default();

        let mut transcripts: Vec<RawTranscript> = rows.iter().filter_map(transcript_from_row).filter(|t| t.date <= baseline_date).collect();
        transcripts.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(transcripts.into_iter().next())
    }
}

fn transcript_from_row(row: &Value) -> Option<RawTranscript> {
    let date = alias_str(row, &["date"]).and_then(|s| NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d").ok())?;
    let quarter = row.get("quarter").and_then(Value::as_u64).unwrap_or(0) as u32;
    let year = row.get("year").and_then(Value::as_u64).unwrap_or(0) as u32;
    let content = alias_str(row, &["content"])?.to_string();
    Some(RawTranscript { date, quarter, year, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_transcript_row() {
        let row = json!({"date": "2024-04-20", "quarter": 1, "year": 2024, "content": "Thank you for joining..."});
        let transcript = transcript_from_row(&row).unwrap();
        assert_eq!(transcript.quarter, 1);
        assert!(transcript.content.starts_with("Thank you"));
    }

    #[test]
    fn missing_content_skips_row() {
        let row = json!({"date": "2024-04-20", "quarter": 1, "year": 2024});
        assert!(transcript_from_row(&row).is_none());
    }
}

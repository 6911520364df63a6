//! SEC filing descriptors + MD&A text (spec.md §4.5, §4.6.1). Uses
//! the FMP filings index for descriptors and a secondary fetch for the
//! raw filing document text that the filing-summary fragment excerpts.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::{alias_str, get_json};
use crate::config::Config;
use crate::domain::FilingDescriptor;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";

pub struct FilingsAdapter {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl FilingsAdapter {
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

    /// Returns the most recent 10-K/10-Q descriptors filed on or before
    /// `baseline_date`, newest first.
    pub async fn recent_filings(&self, ticker: &str, baseline_date: NaiveDate, limit: usize) -> Result<Vec<FilingDescriptor>, AppError> {
        let url = format!("{FMP_BASE}/sec_filings/{ticker}");
        let body = get_json(&self.client, &url, &[("apikey", self.api_key().to_string())], self.timeout, self.attempts, self.delay).await?;
        let rows = body.as_array().cloned().unwrap_or_default();

        let mut descriptors: Vec<FilingDescriptor> = rows
            .iter()
            .filter_map(|row| descriptor_from_row(row))
            .filter(|d| d.filing_date <= baseline_date)
            .collect();
        descriptors.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
        descriptors.truncate(limit);
        Ok(descriptors)
    }

    /// Fetches the raw filing document text for MD&A excerpting. FMP's
    /// filing index only links to the EDGAR document; we fetch it as
    /// plain text and let the fragment builder excerpt/summarize.
    pub async fn fetch_document_text(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| AppError::classify_upstream(err.status().map(|s| s.as_u16()), &err.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::classify_upstream(Some(response.status().as_u16()), "filing document fetch failed"));
        }

        response
            .text()
            .await
            .map_err(|err| AppError::UpstreamFatal(format!("failed reading filing document body: {err}")))
    }
}

fn descriptor_from_row(row: &Value) -> Option<FilingDescriptor> {
    let form = alias_str(row, &["type", "form"])?.to_string();
    let filing_date = alias_str(row, &["fillingDate", "filingDate"]).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
    let report_date = alias_str(row, &["acceptedDate", "reportDate"])
        .and_then(|s| NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d").ok());
    let url = alias_str(row, &["finalLink", "link", "url"])?.to_string();

    Some(FilingDescriptor { form, filing_date, report_date, url })
}

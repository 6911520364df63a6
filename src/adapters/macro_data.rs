//! Macro context: treasury yields, economic calendar, equity risk
//! premium proxy (spec.md §4.5, §4.6.8).

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::{alias_f64, alias_str, get_json};
use crate::config::Config;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";

pub struct RawTreasuryYield {
    pub date: NaiveDate,
    pub year10: f64,
    pub year2: f64,
}

pub struct RawCalendarEvent {
    pub date: NaiveDate,
    pub event: String,
    pub impact: String,
}

pub struct MacroAdapter {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl MacroAdapter {
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

    pub async fn treasury_yields(&self, as_of: NaiveDate) -> Result<RawTreasuryYield, AppError> {
        let url = format!("{FMP_BASE}/treasury");
        let body = get_json(
            &self.client,
            &url,
            &[("from", as_of.to_string()), ("to", as_of.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let row = body.get(0).cloned().ok_or_else(|| AppError::UpstreamFatal("no treasury yield row".to_string()))?;
        Ok(RawTreasuryYield {
            date: as_of,
            year10: alias_f64(&row, &["year10"]).ok_or_else(|| AppError::UpstreamFatal("missing 10y yield".to_string()))?,
            year2: alias_f64(&row, &["year2"]).unwrap_or(0.0),
        })
    }

    pub async fn economic_calendar(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RawCalendarEvent>, AppError> {
        let url = format!("{FMP_BASE}/economic_calendar");
        let body = get_json(
            &self.client,
            &url,
            &[("from", from.to_string()), ("to", to.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(calendar_event_from_row).collect())
    }
}

fn calendar_event_from_row(row: &Value) -> Option<RawCalendarEvent> {
    let date = alias_str(row, &["date"]).and_then(|s| NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d").ok())?;
    let event = alias_str(row, &["event"])?.to_string();
    let impact = alias_str(row, &["impact"]).unwrap_or("Low").to_string();
    Some(RawCalendarEvent { date, event, impact })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_calendar_row() {
        let row = json!({"date": "2024-05-01", "event": "FOMC Rate Decision", "impact": "High"});
        let event = calendar_event_from_row(&row).unwrap();
        assert_eq!(event.impact, "High");
    }

    #[test]
    fn missing_event_skips_row() {
        let row = json!({"date": "2024-05-01", "impact": "High"});
        assert!(calendar_event_from_row(&row).is_none());
    }
}

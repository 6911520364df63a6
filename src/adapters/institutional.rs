//! 13F institutional holders, insider trades, analyst rating-change
//! actions (spec.md §4.5, §4.6.5).

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::{alias_f64, alias_str, get_json};
use crate::config::Config;
use crate::domain::HolderRow;
use crate::error::AppError;

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";

pub struct RawInsiderTrade {
    pub date: NaiveDate,
    pub is_buy: bool,
    pub shares: f64,
    pub value: f64,
}

pub struct InstitutionalAdapter {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl InstitutionalAdapter {
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

    pub async fn top_holders(&self, ticker: &str, limit: usize) -> Result<(Vec<HolderRow>, f64), AppError> {
        let url = format!("{FMP_BASE}/institutional-ownership/symbol-ownership");
        let body = get_json(
            &self.client,
            &url,
            &[("symbol", ticker.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let rows = body.as_array().cloned().unwrap_or_default();

        let mut holders: Vec<HolderRow> = rows.iter().filter_map(holder_from_row).collect();
        holders.sort_by(|a, b| b.position_value.partial_cmp(&a.position_value).unwrap_or(std::cmp::Ordering::Equal));
        let net_shares: f64 = holders.iter().filter_map(|h| h.change_shares).sum();
        holders.truncate(limit);
        Ok((holders, net_shares))
    }

    pub async fn insider_trades(&self, ticker: &str, since: NaiveDate) -> Result<Vec<RawInsiderTrade>, AppError> {
        let url = format!("{FMP_BASE}/insider-trading");
        let body = get_json(
            &self.client,
            &url,
            &[("symbol", ticker.to_string()), ("apikey", self.api_key().to_string())],
            self.timeout,
            self.attempts,
            self.delay,
        )
        .await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(insider_trade_from_row).filter(|t| t.date >= since).collect())
    }
}

fn holder_from_row(row: &Value) -> Option<HolderRow> {
    let holder_name = alias_str(row, &["investorName", "holder"])?.to_string();
    let shares = alias_f64(row, &["sharesNumber", "shares"])?;
    let change_shares = alias_f64(row, &["changeInSharesNumber", "changeShares"]);
    let position_value = alias_f64(row, &["marketValue", "positionValue"]).unwrap_or(0.0);
    Some(HolderRow { holder_name, shares, change_shares, position_value })
}

fn insider_trade_from_row(row: &Value) -> Option<RawInsiderTrade> {
    let date = alias_str(row, &["transactionDate", "date"]).and_then(|s| NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d").ok())?;
    let acquisition = alias_str(row, &["acquisitionOrDisposition", "transactionType"]).unwrap_or("");
    let is_buy = acquisition.eq_ignore_ascii_case("a") || acquisition.to_ascii_uppercase().contains("BUY") || acquisition.to_ascii_uppercase().contains("P-PURCHASE");
    let shares = alias_f64(row, &["securitiesTransacted", "shares"]).unwrap_or(0.0);
    let price = alias_f64(row, &["price"]).unwrap_or(0.0);
    Some(RawInsiderTrade { date, is_buy, shares, value: shares * price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_holder_row() {
        let row = json!({"investorName": "Vanguard", "sharesNumber": 1_000_000.0, "changeInSharesNumber": 5000.0, "marketValue": 1.5e8});
        let holder = holder_from_row(&row).unwrap();
        assert_eq!(holder.holder_name, "Vanguard");
        assert_eq!(holder.change_shares, Some(5000.0));
    }

    #[test]
    fn insider_trade_classifies_buy() {
        let row = json!({
            "transactionDate": "2024-02-01",
            "acquisitionOrDisposition": "A",
            "securitiesTransacted": 100.0,
            "price": 50.0,
        });
        let trade = insider_trade_from_row(&row).unwrap();
        assert!(trade.is_buy);
        assert_eq!(trade.value, 5000.0);
    }
}

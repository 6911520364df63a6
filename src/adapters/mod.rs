//! C5: typed façades over each vendor. This is the only layer where
//! vendor-specific field names exist (spec.md §4.5); callers see
//! canonical shapes.

pub mod analyst;
pub mod filings;
pub mod institutional;
pub mod macro_data;
pub mod news;
pub mod quotes;
pub mod transcripts;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::retry::with_retries;

/// Shared GET-JSON helper: enforces a per-call timeout (spec.md §4.5:
/// 15-30s) and classifies failures for the retry primitive.
pub async fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    timeout: Duration,
    attempts: u32,
    delay: Duration,
) -> Result<Value, AppError> {
    with_retries(
        || async {
            debug!(url, "fetching upstream");
            let response = client
                .get(url)
                .query(query)
                .timeout(timeout)
                .send()
                .await
                .map_err(|err| AppError::classify_upstream(err.status().map(|s| s.as_u16()), &err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::classify_upstream(Some(status.as_u16()), &body));
            }

            response
                .json::<Value>()
                .await
                .map_err(|err| AppError::UpstreamFatal(format!("invalid JSON from {url}: {err}")))
        },
        attempts,
        delay,
    )
    .await
}

/// Canonical field aliasing: tries each alias in order, returning the
/// first present, non-null value (spec.md §4.5, e.g.
/// `targetMean` from `targetConsensus|targetMean|targetAvg`).
pub fn alias_f64(value: &Value, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|key| value.get(*key).and_then(Value::as_f64))
}

pub fn alias_str<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

pub fn alias_value(value: &Value, aliases: &[&str]) -> Option<Value> {
    aliases.iter().find_map(|key| value.get(*key).cloned())
}

pub fn parse_into<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| AppError::UpstreamFatal(format!("schema mismatch: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alias_f64_prefers_first_present() {
        let v = json!({"targetAvg": 150.0, "targetMean": 160.0});
        assert_eq!(alias_f64(&v, &["targetConsensus", "targetMean", "targetAvg"]), Some(160.0));
    }

    #[test]
    fn alias_f64_falls_through_missing_keys() {
        let v = json!({"targetAvg": 150.0});
        assert_eq!(alias_f64(&v, &["targetConsensus", "targetMean", "targetAvg"]), Some(150.0));
    }
}

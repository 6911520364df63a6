use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifies a single analysis request. Immutable for the lifetime of
/// the request; every cache tier derives its keys from this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub ticker: String,
    pub baseline_date: NaiveDate,
    pub model_variant: String,
}

impl RequestKey {
    pub fn new(ticker: &str, baseline_date: NaiveDate, model_variant: impl Into<String>) -> Self {
        Self {
            ticker: ticker.trim().to_ascii_uppercase(),
            baseline_date,
            model_variant: model_variant.into(),
        }
    }

    /// Storage key for the results store: `TICKER|DATE|VARIANT`.
    pub fn storage_key(&self) -> String {
        format!("{}|{}|{}", self.ticker, self.baseline_date, self.model_variant)
    }

    /// The three model variants (`<m>`, `<m>__full`, `<m>__metrics`) that
    /// a cache-reset must clear together (spec.md `/api/reset-cache`).
    pub fn sibling_variants(model: &str) -> [String; 3] {
        [
            model.to_string(),
            format!("{model}__full"),
            format!("{model}__metrics"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_ticker() {
        let key = RequestKey::new("aapl", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), "gpt__full");
        assert_eq!(key.ticker, "AAPL");
    }

    #[test]
    fn storage_key_is_stable() {
        let key = RequestKey::new("NVDA", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), "gpt__full");
        assert_eq!(key.storage_key(), "NVDA|2024-01-02|gpt__full");
    }

    #[test]
    fn sibling_variants_cover_all_three() {
        let variants = RequestKey::sibling_variants("gpt-4o");
        assert_eq!(variants, ["gpt-4o", "gpt-4o__full", "gpt-4o__metrics"]);
    }
}

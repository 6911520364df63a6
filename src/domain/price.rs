use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceKind {
    RealTime,
    Historical,
}

/// A priced snapshot for the baseline date, enriched with whatever the
/// winning source provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMeta {
    pub value: f64,
    pub as_of: DateTime<Utc>,
    /// e.g. `real-time_fmp`, `historical_fmp_historical`, `real-time_fallback`.
    pub source: String,
    pub kind: PriceKind,
    pub extended: bool,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub intraday: Option<f64>,
    pub market_cap: Option<f64>,
}

impl PriceMeta {
    /// Invariant (spec.md §3, §8): `kind == historical` iff `baseline_date < today`.
    pub fn expected_kind(baseline_date: chrono::NaiveDate, today: chrono::NaiveDate) -> PriceKind {
        if baseline_date < today {
            PriceKind::Historical
        } else {
            PriceKind::RealTime
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn historical_iff_before_today() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let past = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(PriceMeta::expected_kind(past, today), PriceKind::Historical);
        assert_eq!(PriceMeta::expected_kind(today, today), PriceKind::RealTime);
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTargetConfidence {
    High,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTargetSummary {
    pub target_mean: Option<f64>,
    pub target_high: Option<f64>,
    pub target_low: Option<f64>,
    pub publisher_count: u32,
    pub confidence: PriceTargetConfidence,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatesFragment {
    pub quarterly: Vec<serde_json::Value>,
    pub annual: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingTrend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsFragment {
    pub snapshot: serde_json::Value,
    pub historical: Vec<serde_json::Value>,
    pub trend: RatingTrend,
    pub trend_delta: f64,
    pub trend_window_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradesFragment {
    pub recent_actions: Vec<serde_json::Value>,
    pub historical_counts: serde_json::Value,
    pub consensus: Option<String>,
}

/// Each sub-fragment is independently cacheable with its own TTL
/// (spec.md §3, §4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystSignals {
    pub price_target_summary: Option<PriceTargetSummary>,
    pub estimates: Option<EstimatesFragment>,
    pub ratings: Option<RatingsFragment>,
    pub grades: Option<GradesFragment>,
}

impl RatingsFragment {
    /// spec.md §4.6.4: anchor = first historical entry at least 30 days
    /// older than the latest; trend = sign(latest.score - anchor.score).
    pub fn compute_trend(
        history_desc: &[(NaiveDate, f64)],
    ) -> (RatingTrend, f64, i64) {
        let Some((latest_date, latest_score)) = history_desc.first().copied() else {
            return (RatingTrend::Flat, 0.0, 0);
        };
        let anchor = history_desc
            .iter()
            .find(|(d, _)| (latest_date - *d).num_days() >= 30);
        let Some((anchor_date, anchor_score)) = anchor.copied() else {
            return (RatingTrend::Flat, 0.0, 0);
        };
        let delta = latest_score - anchor_score;
        let trend = if delta > 0.0 {
            RatingTrend::Up
        } else if delta < 0.0 {
            RatingTrend::Down
        } else {
            RatingTrend::Flat
        };
        (trend, delta, (latest_date - anchor_date).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_requires_anchor_at_least_30_days_old() {
        let history = vec![
            (NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 4.5),
            (NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(), 4.0), // only 10 days old, skipped
            (NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 3.0), // 46 days old, anchor
        ];
        let (trend, delta, window) = RatingsFragment::compute_trend(&history);
        assert_eq!(trend, RatingTrend::Up);
        assert_eq!(delta, 1.5);
        assert_eq!(window, 46);
    }

    #[test]
    fn no_anchor_yields_flat() {
        let history = vec![(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 4.5)];
        let (trend, delta, window) = RatingsFragment::compute_trend(&history);
        assert_eq!(trend, RatingTrend::Flat);
        assert_eq!(delta, 0.0);
        assert_eq!(window, 0);
    }
}

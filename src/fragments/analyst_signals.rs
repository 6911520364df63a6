//! 4.6.4 Analyst Signals Builder: price target consensus, estimates,
//! ratings trend, grades — each sub-fragment independently cached and
//! TTL'd, the whole aggregate collapsed across concurrent callers for
//! the same `(ticker, baseline_date)` via `AppState::analyst_inflight`.
//! The in-flight entry is removed once resolved, so the collapse only
//! spans genuinely concurrent callers and later requests re-consult
//! each sub-fragment's own TTL instead of reusing a stale aggregate.

use chrono::{Duration, NaiveDate};
use tokio::sync::OnceCell;
use tracing::warn;

use crate::domain::{
    AnalystSignals, EstimatesFragment, GradesFragment, PriceTargetConfidence, PriceTargetSummary,
    RatingsFragment,
};
use crate::state::AppState;

pub async fn build(state: &AppState, ticker: &str, baseline_date: NaiveDate, today: NaiveDate) -> AnalystSignals {
    let key = format!("{ticker}|{baseline_date}");
    let cell = state
        .analyst_inflight
        .entry(key.clone())
        .or_insert_with(|| std::sync::Arc::new(OnceCell::new()))
        .clone();

    let signals = cell
        .get_or_init(|| async { compute(state, ticker, baseline_date, today).await })
        .await
        .clone();

    // Collapse only spans genuinely concurrent callers (spec.md §4.6.4);
    // drop the entry so later, non-concurrent requests re-run `compute`
    // and re-consult each sub-fragment's own TTL.
    state.analyst_inflight.remove(&key);
    signals
}

async fn compute(state: &AppState, ticker: &str, baseline_date: NaiveDate, today: NaiveDate) -> AnalystSignals {
    let extended = (today - baseline_date).num_days() <= state.config.extended_window_days;

    let price_target_summary = build_price_target(state, ticker).await;
    let ratings = build_ratings(state, ticker).await;
    let (estimates, grades) = if extended {
        (build_estimates(state, ticker).await, build_grades(state, ticker).await)
    } else {
        (None, None)
    };

    AnalystSignals { price_target_summary, estimates, ratings, grades }
}

async fn build_price_target(state: &AppState, ticker: &str) -> Option<PriceTargetSummary> {
    let kv_key = format!("analyst_price_target_{ticker}");
    let ttl = Duration::hours(state.config.analyst_price_target_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<PriceTargetSummary>(&kv_key, ttl) {
        return Some(cached);
    }

    match state.adapters.analyst.price_target_consensus(ticker).await {
        Ok(raw) => {
            let confidence = if raw.publisher_count >= state.config.price_target_sample_threshold {
                PriceTargetConfidence::High
            } else {
                PriceTargetConfidence::Low
            };
            let summary = PriceTargetSummary {
                target_mean: Some(raw.target_mean),
                target_high: raw.target_high,
                target_low: raw.target_low,
                publisher_count: raw.publisher_count,
                confidence,
            };
            if let Err(err) = state.kv_cache.write(&kv_key, &summary) {
                warn!(%err, ticker, "failed to persist price target summary");
            }
            Some(summary)
        }
        Err(err) => {
            warn!(%err, ticker, "price target consensus fetch failed");
            None
        }
    }
}

async fn build_estimates(state: &AppState, ticker: &str) -> Option<EstimatesFragment> {
    let kv_key = format!("analyst_estimates_{ticker}");
    let ttl = Duration::hours(state.config.analyst_estimates_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<EstimatesFragment>(&kv_key, ttl) {
        return Some(cached);
    }

    let quarterly = state.adapters.analyst.estimates(ticker, "quarter").await.unwrap_or_default();
    let annual = state.adapters.analyst.estimates(ticker, "annual").await.unwrap_or_default();
    if quarterly.is_empty() && annual.is_empty() {
        return None;
    }
    let fragment = EstimatesFragment { quarterly, annual };
    if let Err(err) = state.kv_cache.write(&kv_key, &fragment) {
        warn!(%err, ticker, "failed to persist estimates fragment");
    }
    Some(fragment)
}

async fn build_ratings(state: &AppState, ticker: &str) -> Option<RatingsFragment> {
    let kv_key = format!("analyst_ratings_{ticker}");
    let ttl = Duration::hours(state.config.analyst_aggregate_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<RatingsFragment>(&kv_key, ttl) {
        return Some(cached);
    }

    let history = match state.adapters.analyst.ratings_history(ticker).await {
        Ok(history) => history,
        Err(err) => {
            warn!(%err, ticker, "ratings history fetch failed");
            return None;
        }
    };
    if history.is_empty() {
        return None;
    }

    let mut history_desc: Vec<(NaiveDate, f64)> = history.iter().map(|r| (r.date, r.score)).collect();
    history_desc.sort_by(|a, b| b.0.cmp(&a.0));
    let (trend, trend_delta, trend_window_days) = RatingsFragment::compute_trend(&history_desc);

    let snapshot = history_desc
        .first()
        .map(|(date, score)| serde_json::json!({"date": date, "score": score}))
        .unwrap_or(serde_json::Value::Null);
    let historical = history_desc
        .iter()
        .map(|(date, score)| serde_json::json!({"date": date, "score": score}))
        .collect();

    let fragment = RatingsFragment { snapshot, historical, trend, trend_delta, trend_window_days };
    if let Err(err) = state.kv_cache.write(&kv_key, &fragment) {
        warn!(%err, ticker, "failed to persist ratings fragment");
    }
    Some(fragment)
}

async fn build_grades(state: &AppState, ticker: &str) -> Option<GradesFragment> {
    let kv_key = format!("analyst_grades_{ticker}");
    let ttl = Duration::hours(state.config.analyst_aggregate_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<GradesFragment>(&kv_key, ttl) {
        return Some(cached);
    }

    let grades = match state.adapters.analyst.grades(ticker).await {
        Ok(grades) => grades,
        Err(err) => {
            warn!(%err, ticker, "grades fetch failed");
            return None;
        }
    };
    if grades.is_empty() {
        return None;
    }

    let recent_actions: Vec<serde_json::Value> = grades
        .iter()
        .take(10)
        .map(|g| serde_json::json!({"date": g.date, "from": g.from_grade, "to": g.to_grade, "action": g.action}))
        .collect();
    let upgrades = grades.iter().filter(|g| g.action.eq_ignore_ascii_case("upgrade")).count();
    let downgrades = grades.iter().filter(|g| g.action.eq_ignore_ascii_case("downgrade")).count();
    let consensus = grades.first().map(|g| g.to_grade.clone());

    let fragment = GradesFragment {
        recent_actions,
        historical_counts: serde_json::json!({"upgrades": upgrades, "downgrades": downgrades}),
        consensus,
    };
    if let Err(err) = state.kv_cache.write(&kv_key, &fragment) {
        warn!(%err, ticker, "failed to persist grades fragment");
    }
    Some(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_thresholds_respect_sample_size() {
        let high = PriceTargetConfidence::High;
        let low = PriceTargetConfidence::Low;
        assert_ne!(
            serde_json::to_string(&high).unwrap(),
            serde_json::to_string(&low).unwrap()
        );
    }
}

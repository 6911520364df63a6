//! 4.6.8 Macro Context Builder: treasury yield curve spread and a
//! trimmed economic calendar window around the baseline date.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::state::AppState;

const CALENDAR_LOOKAHEAD_DAYS: i64 = 14;
const CALENDAR_LOOKBACK_DAYS: i64 = 7;
const MAX_EVENTS: usize = 10;

pub async fn build(state: &AppState, baseline_date: NaiveDate) -> Option<serde_json::Value> {
    let kv_key = format!("macro_{baseline_date}");
    let ttl = Duration::hours(state.config.momentum_cache_ttl_hours);
    if let Some(cached) = state.kv_cache.read::<serde_json::Value>(&kv_key, ttl) {
        return Some(cached);
    }

    let yields = state.adapters.macro_data.treasury_yields(baseline_date).await.ok();
    let from = baseline_date - Duration::days(CALENDAR_LOOKBACK_DAYS);
    let to = baseline_date + Duration::days(CALENDAR_LOOKAHEAD_DAYS);
    let events = match state.adapters.macro_data.economic_calendar(from, to).await {
        Ok(events) => events,
        Err(err) => {
            warn!(%err, "economic calendar fetch failed");
            Vec::new()
        }
    };

    if yields.is_none() && events.is_empty() {
        return None;
    }

    let spread = yields.as_ref().map(|y| y.year10 - y.year2);
    let trimmed: Vec<_> = events
        .iter()
        .take(MAX_EVENTS)
        .map(|e| serde_json::json!({"date": e.date, "event": e.event, "impact": e.impact}))
        .collect();
    if events.len() > MAX_EVENTS {
        warn!(total = events.len(), kept = MAX_EVENTS, "economic calendar window trimmed");
    }

    let value = serde_json::json!({
        "treasury": yields.map(|y| serde_json::json!({"date": y.date, "year10": y.year10, "year2": y.year2})),
        "yield_curve_spread": spread,
        "calendar_events": trimmed,
    });

    if let Err(err) = state.kv_cache.write(&kv_key, &value) {
        warn!(%err, "failed to persist macro context");
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_is_year10_minus_year2() {
        let y10 = 4.3;
        let y2 = 4.8;
        assert!((y10 - y2 - (-0.5)).abs() < 1e-9);
    }
}

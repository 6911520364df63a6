//! C8: payload compaction + target-price guardrails (spec.md §4.8).
//! Compaction shrinks the JSON payload handed to the LLM; guardrails
//! clamp the LLM's returned target price afterward.

use serde_json::Value;

use crate::config::Config;
use crate::domain::{AnalysisOutput, Guardrails};

const DEFAULT_STRING_LIMIT: usize = 300;
const LONG_FIELD_STRING_LIMIT: usize = 900;
const LONG_FIELD_SUFFIXES: &[&str] = &["summary", "explanation", "mda"];

/// Recursively truncates strings, nulls out non-finite numbers, and
/// drops empty containers / all-null objects.
pub fn compact_payload(value: &Value) -> Value {
    compact_field(None, value)
}

fn compact_field(field_name: Option<&str>, value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let limit = if is_long_field(field_name) { LONG_FIELD_STRING_LIMIT } else { DEFAULT_STRING_LIMIT };
            Value::String(s.chars().take(limit).collect())
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => value.clone(),
        },
        Value::Array(items) => {
            let compacted: Vec<Value> = items.iter().map(|item| compact_field(field_name, item)).collect();
            Value::Array(compacted)
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, val) in map {
                let compacted = compact_field(Some(key), val);
                if is_empty_container(&compacted) {
                    continue;
                }
                out.insert(key.clone(), compacted);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn is_long_field(field_name: Option<&str>) -> bool {
    let Some(name) = field_name else { return false };
    let lower = name.to_ascii_lowercase();
    LONG_FIELD_SUFFIXES.iter().any(|suffix| lower.contains(suffix))
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty() || map.values().all(|v| v.is_null()),
        _ => false,
    }
}

/// spec.md §4.8: clamp `tgt` into a guardrail band unless confidence is
/// high. Records `action.guardrail_note` and appends a rationale note
/// when clamped.
pub fn apply_guardrails(config: &Config, output: &mut AnalysisOutput, guardrails: Guardrails, current_price: f64) {
    if current_price <= 0.0 {
        return;
    }
    if output.confidence() == Some("high") {
        return;
    }
    let Some(target) = output.target_price() else { return };

    let (min_mult, max_mult) = if guardrails.any_triggered() {
        (config.weak_signal_target_floor, config.weak_signal_target_cap)
    } else {
        (config.llm_target_min_multiplier, config.llm_target_max_multiplier)
    };
    let min_target = current_price * min_mult;
    let max_target = current_price * max_mult;
    let clamped = target.clamp(min_target, max_target);

    if (clamped - target).abs() > f64::EPSILON {
        output.set_target_price(clamped);
        output.set_guardrail_note("目標價已依風險護欄調整");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            port: 0,
            kv_cache_dir: String::new(),
            results_db_path: String::new(),
            realtime_result_ttl_hours: 12,
            historical_result_ttl_days: 120,
            filing_summary_ttl_days: 180,
            news_cache_ttl_hours: 6,
            momentum_cache_ttl_hours: 6,
            thirteenf_ttl_days: 30,
            earnings_call_ttl_days: 30,
            analyst_aggregate_ttl_hours: 24,
            analyst_price_target_ttl_hours: 24,
            analyst_estimates_ttl_hours: 24,
            api_retry_attempts: 3,
            api_retry_delay_ms: 10,
            batch_concurrency: 3,
            max_filings_for_llm: 2,
            news_article_limit: 4,
            momentum_strong_threshold: 70.0,
            momentum_severe_threshold: 20.0,
            weak_signal_target_cap: 1.25,
            weak_signal_target_floor: 0.8,
            llm_target_max_multiplier: 1.8,
            llm_target_min_multiplier: 0.6,
            price_target_sample_threshold: 3,
            extended_window_days: 14,
            prewarm_tickers: vec![],
            prewarm_interval_hours: 6,
            prewarm_include_llm: false,
            llm_api_base: String::new(),
            llm_api_key: None,
            llm_model: String::new(),
            llm_fallback_model: String::new(),
            llm_repair_model: String::new(),
        }
    }

    #[test]
    fn truncates_default_strings_to_300() {
        let value = json!({"note": "x".repeat(500)});
        let compacted = compact_payload(&value);
        assert_eq!(compacted["note"].as_str().unwrap().len(), 300);
    }

    #[test]
    fn allows_900_for_summary_like_fields() {
        let value = json!({"mda_summary": "x".repeat(1000)});
        let compacted = compact_payload(&value);
        assert_eq!(compacted["mda_summary"].as_str().unwrap().len(), 900);
    }

    #[test]
    fn drops_empty_containers() {
        let value = json!({"keep": 1, "drop_list": [], "drop_obj": {"a": null}});
        let compacted = compact_payload(&value);
        assert_eq!(compacted, json!({"keep": 1}));
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let value = json!({"score": f64::NAN});
        let compacted = compact_payload(&value);
        assert!(compacted.get("score").is_none() || compacted["score"].is_null());
    }

    fn output_with(rating: &str, target: f64, confidence: &str) -> AnalysisOutput {
        serde_json::from_value(json!({
            "action": {"rating": rating, "target_price": target, "confidence": confidence, "rationale": "x"}
        }))
        .unwrap()
    }

    #[test]
    fn clamps_target_into_tight_band_when_guardrails_triggered() {
        let config = test_config();
        let mut output = output_with("BUY", 500.0, "medium");
        let guardrails = Guardrails { severe_momentum: true, selling_pressure: false };
        apply_guardrails(&config, &mut output, guardrails, 100.0);
        assert_eq!(output.target_price(), Some(125.0));
        assert!(output.action.get("guardrail_note").is_some());
    }

    #[test]
    fn high_confidence_skips_clamp() {
        let config = test_config();
        let mut output = output_with("BUY", 500.0, "high");
        apply_guardrails(&config, &mut output, Guardrails::default(), 100.0);
        assert_eq!(output.target_price(), Some(500.0));
    }

    #[test]
    fn within_band_is_unchanged() {
        let config = test_config();
        let mut output = output_with("BUY", 120.0, "medium");
        apply_guardrails(&config, &mut output, Guardrails::default(), 100.0);
        assert_eq!(output.target_price(), Some(120.0));
        assert!(output.action.get("guardrail_note").is_none());
    }
}

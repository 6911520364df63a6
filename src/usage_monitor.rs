//! C13: adaptive usage monitor. Accumulates LLM cost over a sliding
//! window and shrinks fragment size limits when the window's
//! total-cost rate exceeds a threshold (spec.md §4.13).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

const WINDOW: Duration = Duration::minutes(10);
/// Cost-per-minute rate above which limits shrink.
const COST_RATE_THRESHOLD_PER_MIN: f64 = 0.50;
const SHRUNK_MAX_FILINGS: usize = 1;
const SHRUNK_NEWS_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveLimits {
    pub max_filings: usize,
    pub news_limit: usize,
}

struct Sample {
    at: DateTime<Utc>,
    cost: f64,
}

pub struct UsageMonitor {
    samples: Mutex<VecDeque<Sample>>,
}

impl UsageMonitor {
    pub fn new() -> Self {
        Self { samples: Mutex::new(VecDeque::new()) }
    }

    pub fn record_cost(&self, cost: f64) {
        let mut samples = self.samples.lock().unwrap();
        samples.push_back(Sample { at: Utc::now(), cost });
        Self::evict_stale(&mut samples);
    }

    fn evict_stale(samples: &mut VecDeque<Sample>) {
        let cutoff = Utc::now() - WINDOW;
        while matches!(samples.front(), Some(s) if s.at < cutoff) {
            samples.pop_front();
        }
    }

    fn window_cost_rate_per_min(&self) -> f64 {
        let mut samples = self.samples.lock().unwrap();
        Self::evict_stale(&mut samples);
        if samples.is_empty() {
            return 0.0;
        }
        let total: f64 = samples.iter().map(|s| s.cost).sum();
        total / (WINDOW.num_minutes().max(1) as f64)
    }

    /// `getAdaptiveLimits(defaults)`: shrinks `max_filings`/`news_limit`
    /// when the window's cost rate exceeds the threshold.
    pub fn adaptive_limits(&self, default_max_filings: usize, default_news_limit: usize) -> AdaptiveLimits {
        if self.window_cost_rate_per_min() > COST_RATE_THRESHOLD_PER_MIN {
            AdaptiveLimits {
                max_filings: SHRUNK_MAX_FILINGS.min(default_max_filings),
                news_limit: SHRUNK_NEWS_LIMIT.min(default_news_limit),
            }
        } else {
            AdaptiveLimits { max_filings: default_max_filings, news_limit: default_news_limit }
        }
    }
}

impl Default for UsageMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_usage_keeps_defaults() {
        let monitor = UsageMonitor::new();
        monitor.record_cost(0.001);
        let limits = monitor.adaptive_limits(2, 4);
        assert_eq!(limits.max_filings, 2);
        assert_eq!(limits.news_limit, 4);
    }

    #[test]
    fn heavy_usage_shrinks_limits() {
        let monitor = UsageMonitor::new();
        for _ in 0..20 {
            monitor.record_cost(1.0);
        }
        let limits = monitor.adaptive_limits(2, 4);
        assert_eq!(limits.max_filings, 1);
        assert_eq!(limits.news_limit, 2);
    }
}

//! C12: on startup and every `prewarm_interval_hours`, warms the cache
//! for each configured ticker against today's date (spec.md §4.12).
//! Errors are logged, never fatal — this runs detached from the
//! request path.

use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::orchestrator::modes::Mode;
use crate::orchestrator::{self, AnalyzeRequest};
use crate::state::AppState;

pub fn spawn(state: AppState) {
    if state.config.prewarm_tickers.is_empty() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(state.config.prewarm_interval_hours * 3600));
        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    });
}

async fn run_once(state: &AppState) {
    let today = chrono::Utc::now().date_naive();
    let mode = if state.config.prewarm_include_llm { Mode::Full } else { Mode::MetricsOnly };

    for symbol in &state.config.prewarm_tickers {
        let request = AnalyzeRequest {
            ticker: symbol.clone(),
            baseline_date: today,
            model: state.config.llm_model.clone(),
            mode,
        };
        match orchestrator::analyze(state, request).await {
            Ok(_) => info!(ticker = %symbol, "prewarm completed"),
            Err(err) => warn!(%err, ticker = %symbol, "prewarm failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_depends_on_include_llm_flag() {
        assert_eq!(if true { Mode::Full } else { Mode::MetricsOnly }, Mode::Full);
        assert_eq!(if false { Mode::Full } else { Mode::MetricsOnly }, Mode::MetricsOnly);
    }
}

//! 4.6.2 Price Meta Builder. Ordered source chains per mode, every
//! success enriching the snapshot with whatever the adapter provides.

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::adapters::quotes::RawQuote;
use crate::domain::{PriceKind, PriceMeta};
use crate::state::AppState;

use super::prior_trading_day;

const MAX_BACKFILL_DAYS: u32 = 7;

pub async fn build(state: &AppState, ticker: &str, baseline_date: NaiveDate, today: NaiveDate) -> PriceMeta {
    match PriceMeta::expected_kind(baseline_date, today) {
        PriceKind::Historical => build_historical(state, ticker, baseline_date).await,
        PriceKind::RealTime => build_realtime(state, ticker).await,
    }
}

async fn build_historical(state: &AppState, ticker: &str, baseline_date: NaiveDate) -> PriceMeta {
    let mut trading_day = baseline_date;
    for attempt in 0..=MAX_BACKFILL_DAYS {
        match state.adapters.quotes.fmp_historical(ticker, trading_day).await {
            Ok(quote) => {
                let source = if attempt == 0 { "historical_fmp" } else { "historical_fmp_backfill" };
                return from_quote(quote, PriceKind::Historical, source);
            }
            Err(err) => {
                warn!(%err, ticker, %trading_day, "fmp historical lookup failed, stepping back a trading day");
                trading_day = prior_trading_day(trading_day);
            }
        }
    }

    match state.adapters.quotes.yahoo_chart(ticker, baseline_date).await {
        Ok(quote) => from_quote(quote, PriceKind::Historical, "historical_yahoo"),
        Err(err) => {
            warn!(%err, ticker, "yahoo chart fallback also failed");
            fallback_price_meta()
        }
    }
}

async fn build_realtime(state: &AppState, ticker: &str) -> PriceMeta {
    let hot_key = format!("fh_quote_{ticker}");
    if let Some(cached) = state.process_cache.get(&hot_key) {
        if let Ok(quote) = serde_json::from_value::<RawQuote>(cached) {
            return from_quote(quote, PriceKind::RealTime, "real-time_hot");
        }
    }

    match state.adapters.quotes.fmp_live_quote(ticker).await {
        Ok(quote) => {
            if let Ok(value) = serde_json::to_value(&quote) {
                state.process_cache.set(hot_key, value);
            }
            from_quote(quote, PriceKind::RealTime, "real-time_fmp")
        }
        Err(err) => {
            warn!(%err, ticker, "fmp live quote failed, trying yahoo");
            match state.adapters.quotes.yahoo_live_quote(ticker).await {
                Ok(quote) => from_quote(quote, PriceKind::RealTime, "real-time_yahoo"),
                Err(err) => {
                    warn!(%err, ticker, "yahoo live quote also failed");
                    fallback_price_meta()
                }
            }
        }
    }
}

fn from_quote(quote: RawQuote, kind: PriceKind, source: &str) -> PriceMeta {
    PriceMeta {
        value: quote.price,
        as_of: quote.as_of,
        source: source.to_string(),
        kind,
        extended: false,
        year_high: quote.year_high,
        year_low: quote.year_low,
        ma50: quote.ma50,
        ma200: quote.ma200,
        intraday: quote.intraday,
        market_cap: quote.market_cap,
    }
}

fn fallback_price_meta() -> PriceMeta {
    PriceMeta {
        value: 0.0,
        as_of: Utc::now(),
        source: "real-time_fallback".to_string(),
        kind: PriceKind::RealTime,
        extended: false,
        year_high: None,
        year_low: None,
        ma50: None,
        ma200: None,
        intraday: None,
        market_cap: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_has_zero_value_and_fallback_source() {
        let meta = fallback_price_meta();
        assert_eq!(meta.value, 0.0);
        assert_eq!(meta.source, "real-time_fallback");
    }
}

//! 4.6.3 Momentum Builder: EOD bars → returns, moving averages, RSI,
//! ATR, volume ratio, trend classification, sector-proxy ETF return.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::adapters::quotes::DailyBar;
use crate::domain::{EtfProxy, MomentumMetrics, MovingAverages, PeriodReturns, PriceVsMa, Trend};
use crate::state::AppState;

const LOOKBACK_TRADING_DAYS: i64 = 420;
const MIN_BARS_REQUIRED: usize = 60;

pub async fn build(state: &AppState, ticker: &str, baseline_date: NaiveDate) -> Option<MomentumMetrics> {
    let from = baseline_date - Duration::days(LOOKBACK_TRADING_DAYS);
    let bars = match state.adapters.quotes.daily_bars(ticker, from, baseline_date).await {
        Ok(bars) if bars.len() >= MIN_BARS_REQUIRED => bars,
        Ok(_) => {
            warn!(ticker, "insufficient bars for momentum computation");
            return None;
        }
        Err(err) => {
            warn!(%err, ticker, "momentum bar fetch failed");
            return None;
        }
    };

    let etf_symbol = sector_etf_for(ticker);
    let etf_return_3m = fetch_etf_return_3m(state, etf_symbol, from, baseline_date).await;

    Some(compute_from_bars(bars.as_slice(), baseline_date, etf_symbol, etf_return_3m))
}

/// spec.md §4.6.3: select a sector-proxy ETF and report its 3-month
/// return alongside the ticker's own momentum figures.
async fn fetch_etf_return_3m(state: &AppState, etf_symbol: &str, from: NaiveDate, baseline_date: NaiveDate) -> Option<f64> {
    match state.adapters.quotes.daily_bars(etf_symbol, from, baseline_date).await {
        Ok(bars) if !bars.is_empty() => return_over(&bars, bars.len() - 1, 63),
        Ok(_) => None,
        Err(err) => {
            warn!(%err, etf_symbol, "etf proxy bar fetch failed");
            None
        }
    }
}

fn compute_from_bars(bars: &[DailyBar], reference_date: NaiveDate, etf_symbol: &str, etf_return_3m: Option<f64>) -> MomentumMetrics {
    let last_idx = bars.len() - 1;
    let close = bars[last_idx].close;

    let returns = PeriodReturns {
        m3: return_over(bars, last_idx, 63),
        m6: return_over(bars, last_idx, 126),
        m12: return_over(bars, last_idx, 252),
    };

    let moving_averages = MovingAverages {
        sma20: sma(bars, last_idx, 20),
        sma50: sma(bars, last_idx, 50),
        sma200: sma(bars, last_idx, 200),
    };

    let rsi14 = rsi(bars, last_idx, 14);
    let atr14 = atr(bars, last_idx, 14);
    let volume_ratio = volume_ratio(bars, last_idx);

    let above_sma50 = moving_averages.sma50.map(|sma| close > sma).unwrap_or(false);
    let above_sma200 = moving_averages.sma200.map(|sma| close > sma).unwrap_or(false);
    let price_vs_ma = PriceVsMa { above_sma50, above_sma200 };

    let return3m = returns.m3.unwrap_or(0.0);
    let trend = if above_sma50 && above_sma200 && return3m > 0.10 {
        Trend::Strong
    } else if !above_sma50 && !above_sma200 && return3m < -0.05 {
        Trend::Weak
    } else {
        Trend::Neutral
    };

    let mut score = 50.0;
    score += (return3m * 200.0).clamp(-20.0, 20.0);
    score += (returns.m6.unwrap_or(0.0) * 150.0).clamp(-15.0, 15.0);
    score += (returns.m12.unwrap_or(0.0) * 100.0).clamp(-10.0, 10.0);
    score += ((rsi14.unwrap_or(50.0) - 50.0) / 2.0).clamp(-10.0, 10.0);
    score += ((volume_ratio.unwrap_or(1.0) - 1.0) * 20.0).clamp(-10.0, 10.0);
    score += if above_sma50 { 5.0 } else { -5.0 };
    score += if above_sma200 { 5.0 } else { -5.0 };
    let score = MomentumMetrics::clamp_score(score);

    MomentumMetrics {
        score,
        trend,
        returns,
        moving_averages,
        rsi14,
        atr14,
        volume_ratio,
        price_vs_ma,
        etf: Some(EtfProxy { symbol: etf_symbol.to_string(), return_3m: etf_return_3m }),
        reference_date,
    }
}

fn return_over(bars: &[DailyBar], last_idx: usize, trading_days_back: usize) -> Option<f64> {
    if last_idx < trading_days_back {
        return None;
    }
    let past = bars[last_idx - trading_days_back].close;
    if past == 0.0 {
        return None;
    }
    Some((bars[last_idx].close - past) / past)
}

fn sma(bars: &[DailyBar], last_idx: usize, window: usize) -> Option<f64> {
    if last_idx + 1 < window {
        return None;
    }
    let slice = &bars[last_idx + 1 - window..=last_idx];
    Some(slice.iter().map(|b| b.close).sum::<f64>() / window as f64)
}

fn rsi(bars: &[DailyBar], last_idx: usize, window: usize) -> Option<f64> {
    if last_idx < window {
        return None;
    }
    let slice = &bars[last_idx - window..=last_idx];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in slice.windows(2) {
        let delta = pair[1].close - pair[0].close;
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    if gains + losses == 0.0 {
        return Some(50.0);
    }
    let avg_gain = gains / window as f64;
    let avg_loss = losses / window as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// True range needs a high/low; the upstream bar only carries close, so
/// this approximates with the absolute day-over-day close delta.
fn atr(bars: &[DailyBar], last_idx: usize, window: usize) -> Option<f64> {
    if last_idx < window {
        return None;
    }
    let slice = &bars[last_idx - window..=last_idx];
    let total: f64 = slice.windows(2).map(|pair| (pair[1].close - pair[0].close).abs()).sum();
    Some(total / window as f64)
}

fn volume_ratio(bars: &[DailyBar], last_idx: usize) -> Option<f64> {
    if last_idx < 30 {
        return None;
    }
    let avg5 = bars[last_idx - 4..=last_idx].iter().map(|b| b.volume).sum::<f64>() / 5.0;
    let avg30 = bars[last_idx - 29..=last_idx].iter().map(|b| b.volume).sum::<f64>() / 30.0;
    if avg30 == 0.0 {
        return None;
    }
    Some(avg5 / avg30)
}

fn sector_etf_for(ticker: &str) -> &'static str {
    match ticker {
        "AAPL" | "MSFT" | "GOOGL" | "GOOG" | "NVDA" | "META" | "AMD" | "CRM" => "XLK",
        "JPM" | "BAC" | "GS" | "MS" | "WFC" => "XLF",
        "XOM" | "CVX" | "COP" => "XLE",
        "JNJ" | "PFE" | "UNH" | "LLY" => "XLV",
        "AMZN" | "TSLA" | "HD" | "MCD" => "XLY",
        _ => "SPY",
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "強勢")]
    Strong,
    #[serde(rename = "中性")]
    Neutral,
    #[serde(rename = "弱勢")]
    Weak,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MovingAverages {
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeriodReturns {
    pub m3: Option<f64>,
    pub m6: Option<f64>,
    pub m12: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtfProxy {
    pub symbol: String,
    pub return_3m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumMetrics {
    pub score: f64,
    pub trend: Trend,
    pub returns: PeriodReturns,
    pub moving_averages: MovingAverages,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub price_vs_ma: PriceVsMa,
    pub etf: Option<EtfProxy>,
    pub reference_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceVsMa {
    pub above_sma50: bool,
    pub above_sma200: bool,
}

impl MomentumMetrics {
    /// spec.md §4.6.3 / §8: score is always clamped into `[0, 100]`.
    pub fn clamp_score(raw: f64) -> f64 {
        raw.clamp(0.0, 100.0)
    }
}

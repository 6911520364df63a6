use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstitutionalSignal {
    #[serde(rename = "加碼")]
    Accumulating,
    #[serde(rename = "減碼")]
    Reducing,
    #[serde(rename = "持平")]
    Flat,
}

impl InstitutionalSignal {
    /// spec.md §4.6.5 / §8: `加碼 ⇔ net>0`, `減碼 ⇔ net<0`, `持平 ⇔ net==0`.
    pub fn from_net_shares(net_shares: f64) -> Self {
        if net_shares > 0.0 {
            Self::Accumulating
        } else if net_shares < 0.0 {
            Self::Reducing
        } else {
            Self::Flat
        }
    }

    /// Localized label alongside the canonical enum (open question in
    /// spec.md §9: preserve both the enum and a localized label).
    pub fn localized_label(&self) -> &'static str {
        match self {
            Self::Accumulating => "加碼",
            Self::Reducing => "減碼",
            Self::Flat => "持平",
        }
    }

    /// Used by guardrails: does this label indicate selling pressure
    /// (spec.md §4.8: `減碼|賣出|弱勢`)?
    pub fn indicates_selling_pressure(label: &str) -> bool {
        ["減碼", "賣出", "弱勢"].iter().any(|s| label.contains(s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderRow {
    pub holder_name: String,
    pub shares: f64,
    pub change_shares: Option<f64>,
    pub position_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsiderActivity {
    pub buy_count: u32,
    pub sell_count: u32,
    pub buy_value: f64,
    pub sell_value: f64,
    pub last_trades: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystAction {
    pub upgrades_7d: u32,
    pub downgrades_7d: u32,
    pub upgrades_30d: u32,
    pub downgrades_30d: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionalSnapshot {
    pub as_of: DateTime<Utc>,
    pub label: InstitutionalSignal,
    pub net_shares: f64,
    pub top_holders: Vec<HolderRow>,
    pub summary: String,
    pub metrics: serde_json::Value,
    pub insider_activity: Option<InsiderActivity>,
    pub analyst_actions: Option<AnalystAction>,
}

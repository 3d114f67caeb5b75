use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted position. The file format is exactly these five fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub added_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSummary {
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub invested: f64,
    pub current_value: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub change_today: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTotals {
    pub total_invested: f64,
    pub total_current_value: f64,
    pub total_profit: f64,
    pub total_profit_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub holdings: Vec<HoldingSummary>,
    pub totals: PortfolioTotals,
}

impl PortfolioSummary {
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

pub(crate) fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part * 100.0 / whole
    }
}

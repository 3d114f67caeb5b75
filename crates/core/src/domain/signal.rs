use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalAction::StrongBuy => "STRONG_BUY",
            SignalAction::Buy => "BUY",
            SignalAction::Neutral => "NEUTRAL",
            SignalAction::Sell => "SELL",
            SignalAction::StrongSell => "STRONG_SELL",
        }
    }

    pub fn is_strong(self) -> bool {
        matches!(self, SignalAction::StrongBuy | SignalAction::StrongSell)
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub action: SignalAction,
    pub strength: u32,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalIndicators {
    pub symbol: String,
    pub price: f64,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
}

impl TechnicalIndicators {
    /// Percent distance of price from the 20-day average.
    pub fn price_vs_ma20(&self) -> Option<f64> {
        let ma20 = self.ma20.filter(|m| *m != 0.0)?;
        Some((self.price - ma20) / ma20 * 100.0)
    }

    pub fn golden_cross(&self) -> bool {
        matches!((self.ma20, self.ma50), (Some(a), Some(b)) if a > b)
    }
}

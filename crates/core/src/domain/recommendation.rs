use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::signal::SignalAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
    /// Enrichment failed; no score was produced.
    Unknown,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "STRONG_BUY",
            Recommendation::Buy => "BUY",
            Recommendation::Hold => "HOLD",
            Recommendation::Sell => "SELL",
            Recommendation::StrongSell => "STRONG_SELL",
            Recommendation::Unknown => "UNKNOWN",
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Recommendation::StrongBuy | Recommendation::Buy)
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "🚀",
            Recommendation::Buy => "📈",
            Recommendation::Hold => "⏸️",
            Recommendation::Sell => "📉",
            Recommendation::StrongSell => "🔻",
            Recommendation::Unknown => "❔",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "#00C851",
            Recommendation::Buy => "#4CAF50",
            Recommendation::Hold => "#FF9800",
            Recommendation::Sell => "#FF5722",
            Recommendation::StrongSell => "#F44336",
            Recommendation::Unknown => "#9E9E9E",
        }
    }
}

impl From<SignalAction> for Recommendation {
    fn from(action: SignalAction) -> Self {
        match action {
            SignalAction::StrongBuy => Recommendation::StrongBuy,
            SignalAction::Buy => Recommendation::Buy,
            SignalAction::Neutral => Recommendation::Hold,
            SignalAction::Sell => Recommendation::Sell,
            SignalAction::StrongSell => Recommendation::StrongSell,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
    pub momentum: f64,
    pub risk: f64,
}

impl SubScores {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.technical,
            self.fundamental,
            self.sentiment,
            self.momentum,
            self.risk,
        ]
    }
}

/// Output of the composite multi-factor score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub symbol: String,
    pub scores: SubScores,
    pub total_score: f64,
    pub recommendation: Recommendation,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingScoreBreakdown {
    pub technical: SignalAction,
    pub rsi: Option<f64>,
    pub trend: Trend,
}

/// Output of the per-holding score used by the daily analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingScore {
    pub total_score: u8,
    pub recommendation: Recommendation,
    pub breakdown: HoldingScoreBreakdown,
}

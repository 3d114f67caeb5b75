use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::market::MarketOverview;
use crate::domain::portfolio::{HoldingSummary, PortfolioTotals};
use crate::domain::recommendation::Recommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

/// A holding summary joined with its per-holding score and sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedHolding {
    #[serde(flatten)]
    pub summary: HoldingSummary,
    pub sector: String,
    pub ai_score: Option<u8>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorSlice {
    pub sector: String,
    pub value: f64,
    pub percentage: f64,
    pub count: usize,
    pub stocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerRef {
    pub symbol: String,
    pub profit_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub winners: usize,
    pub losers: usize,
    pub win_rate: f64,
    pub best_performer: PerformerRef,
    pub worst_performer: PerformerRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioAnalysis {
    pub is_empty: bool,
    pub totals: PortfolioTotals,
    pub holdings: Vec<EnrichedHolding>,
    pub sector_analysis: Vec<SectorSlice>,
    pub performance_summary: Option<PerformanceSummary>,
}

impl PortfolioAnalysis {
    pub fn empty() -> Self {
        Self {
            is_empty: true,
            totals: PortfolioTotals::default(),
            holdings: Vec::new(),
            sector_analysis: Vec::new(),
            performance_summary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRecommendation {
    pub symbol: String,
    pub action: Recommendation,
    pub ai_score: u8,
    pub reasoning: String,
    pub urgency: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionKind {
    ReviewLosses,
    TakeProfit,
    Diversify,
    IncreaseDiversification,
    IncreaseCash,
    AveragingDown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub message: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskKind {
    SectorConcentration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    #[serde(rename = "type")]
    pub kind: RiskKind,
    pub message: String,
    pub severity: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancingPlan {
    pub needed: bool,
    pub suggestions: Vec<Suggestion>,
    pub risks: Vec<Risk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPick {
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub change_percent: f64,
    pub ai_score: u8,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub priority: Priority,
    pub action: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub portfolio: PortfolioAnalysis,
    pub recommendations: Vec<HoldingRecommendation>,
    pub rebalancing: RebalancingPlan,
    pub top_picks: Vec<TopPick>,
    pub market_overview: Option<MarketOverview>,
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// Unrecognised labels fall back to moderate.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "conservative" => RiskTolerance::Conservative,
            "aggressive" => RiskTolerance::Aggressive,
            _ => RiskTolerance::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedStock {
    pub symbol: String,
    pub sector: String,
    pub shares: u64,
    pub price: f64,
    pub value: f64,
    pub ai_score: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRecommendation {
    pub budget: f64,
    pub risk_tolerance: RiskTolerance,
    pub stocks: Vec<RecommendedStock>,
    pub total_value: f64,
    pub risk_score: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

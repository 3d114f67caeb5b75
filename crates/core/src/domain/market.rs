use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point-in-time quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub previous_close: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Reduced quote used for multi-symbol lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteBrief {
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
}

impl From<&Quote> for QuoteBrief {
    fn from(q: &Quote) -> Self {
        Self {
            symbol: q.symbol.clone(),
            name: q.name.clone(),
            price: q.price,
            change: q.change,
            change_percent: q.change_percent,
            volume: q.volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSeries {
    pub symbol: String,
    pub period: HistoryPeriod,
    pub data: Vec<PricePoint>,
}

impl HistoricalSeries {
    /// Closing prices oldest-first, skipping bars the provider left empty.
    pub fn closes(&self) -> Vec<f64> {
        self.data.iter().filter_map(|p| p.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.data.iter().filter_map(|p| p.volume).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HistoryPeriod {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[default]
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
}

impl HistoryPeriod {
    pub const ALL: [HistoryPeriod; 8] = [
        HistoryPeriod::OneDay,
        HistoryPeriod::FiveDays,
        HistoryPeriod::OneMonth,
        HistoryPeriod::ThreeMonths,
        HistoryPeriod::SixMonths,
        HistoryPeriod::OneYear,
        HistoryPeriod::TwoYears,
        HistoryPeriod::FiveYears,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HistoryPeriod::OneDay => "1d",
            HistoryPeriod::FiveDays => "5d",
            HistoryPeriod::OneMonth => "1mo",
            HistoryPeriod::ThreeMonths => "3mo",
            HistoryPeriod::SixMonths => "6mo",
            HistoryPeriod::OneYear => "1y",
            HistoryPeriod::TwoYears => "2y",
            HistoryPeriod::FiveYears => "5y",
        }
    }

    /// Bar interval requested from the chart endpoint.
    pub fn interval(self) -> &'static str {
        match self {
            HistoryPeriod::OneDay => "5m",
            _ => "1d",
        }
    }

    /// Unrecognised labels fall back to one month.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        HistoryPeriod::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unsupported history period: {s}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystData {
    pub current_price: Option<f64>,
    pub target_mean_price: Option<f64>,
    pub recommendation_mean: Option<f64>,
    pub recommendation_key: Option<String>,
    pub number_of_analyst_opinions: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatistics {
    pub pe_ratio: Option<f64>,
    #[serde(rename = "forwardPE")]
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub profit_margins: Option<f64>,
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialInfo {
    pub symbol: String,
    pub financial_data: AnalystData,
    pub key_statistics: KeyStatistics,
    pub valuation: Valuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Valuation {
    Unknown,
    Undervalued,
    Overvalued,
    #[serde(rename = "Good value")]
    GoodValue,
    Expensive,
    #[serde(rename = "Fair value")]
    FairValue,
}

impl Valuation {
    pub fn from_ratios(pe: Option<f64>, peg: Option<f64>) -> Self {
        let Some(pe) = pe else {
            return Valuation::Unknown;
        };
        if pe < 15.0 {
            return Valuation::Undervalued;
        }
        if pe > 30.0 {
            return Valuation::Overvalued;
        }
        match peg {
            Some(peg) if peg < 1.0 => Valuation::GoodValue,
            Some(peg) if peg > 2.0 => Valuation::Expensive,
            _ => Valuation::FairValue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketTrend {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMover {
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub market_trend: MarketTrend,
    pub top_gainers: Vec<MarketMover>,
    pub top_losers: Vec<MarketMover>,
    pub timestamp: DateTime<Utc>,
}

/// Latest values from the auxiliary indicator service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIndicators {
    pub symbol: String,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub rsi_zone: Option<RsiZone>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiZone {
    Overbought,
    Oversold,
    Neutral,
}

impl RsiZone {
    pub fn classify(rsi: f64) -> Self {
        if rsi > 70.0 {
            RsiZone::Overbought
        } else if rsi < 30.0 {
            RsiZone::Oversold
        } else {
            RsiZone::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_period_falls_back_to_one_month() {
        assert_eq!(HistoryPeriod::parse_lenient("10y"), HistoryPeriod::OneMonth);
        assert_eq!(HistoryPeriod::parse_lenient("6mo"), HistoryPeriod::SixMonths);
        assert_eq!(HistoryPeriod::OneDay.interval(), "5m");
        assert_eq!(HistoryPeriod::FiveYears.interval(), "1d");
    }

    #[test]
    fn valuation_checks_pe_before_peg() {
        assert_eq!(Valuation::from_ratios(None, Some(0.5)), Valuation::Unknown);
        assert_eq!(Valuation::from_ratios(Some(12.0), Some(3.0)), Valuation::Undervalued);
        assert_eq!(Valuation::from_ratios(Some(45.0), Some(0.5)), Valuation::Overvalued);
        assert_eq!(Valuation::from_ratios(Some(20.0), Some(0.8)), Valuation::GoodValue);
        assert_eq!(Valuation::from_ratios(Some(20.0), Some(2.5)), Valuation::Expensive);
        assert_eq!(Valuation::from_ratios(Some(20.0), None), Valuation::FairValue);
    }

    #[test]
    fn valuation_serializes_with_readable_labels() {
        let v = serde_json::to_value(Valuation::GoodValue).unwrap();
        assert_eq!(v, serde_json::json!("Good value"));
    }
}

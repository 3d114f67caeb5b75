use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::portfolio::HoldingSummary;
use crate::domain::recommendation::{Recommendation, ScoreBreakdown};
use crate::domain::report::Priority;
use crate::domain::signal::TechnicalIndicators;
use crate::indicators::technical_indicators;
use crate::market::MarketDataProvider;
use crate::scoring::composite;

const AI_SIGNAL_MIN_SCORE: f64 = 75.0;
const VOLUME_SPIKE_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Absolute percent move from the reference price.
    pub price_move_pct: f64,
    pub profit_pct: f64,
    /// Negative: fires when profit% is at or below it.
    pub loss_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            price_move_pct: 5.0,
            profit_pct: 10.0,
            loss_pct: -5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldingAlertKind {
    PriceChange,
    ProfitTarget,
    LossAlert,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldingAlert {
    pub kind: HoldingAlertKind,
    pub percent: f64,
}

impl HoldingAlert {
    pub fn subject(&self, symbol: &str) -> String {
        match self.kind {
            // Measured against the last alert price, not the day's open.
            HoldingAlertKind::PriceChange => {
                format!("🚨 {symbol} moved {:.2}% from its reference price", self.percent)
            }
            HoldingAlertKind::ProfitTarget => {
                format!("💰 {symbol} reached {:.2}% profit!", self.percent)
            }
            HoldingAlertKind::LossAlert => format!("⚠️ {symbol} is down {:.2}%", self.percent),
        }
    }
}

/// Reference prices for the price-move trigger, one per symbol.
///
/// A reference starts at the opening price hint (previous close) or the first
/// price seen, and moves to the current price each time the trigger fires.
#[derive(Debug, Default, Clone)]
pub struct PriceBaselines {
    refs: HashMap<String, f64>,
}

impl PriceBaselines {
    /// Percent move when it reaches `threshold`, otherwise `None`.
    pub fn check(
        &mut self,
        symbol: &str,
        price: f64,
        opening_reference: Option<f64>,
        threshold: f64,
    ) -> Option<f64> {
        let reference = *self.refs.entry(symbol.to_string()).or_insert_with(|| {
            opening_reference
                .filter(|r| r.is_finite() && *r > 0.0)
                .unwrap_or(price)
        });
        if reference <= 0.0 {
            return None;
        }

        let moved = (price - reference) / reference * 100.0;
        if moved.abs() >= threshold {
            self.refs.insert(symbol.to_string(), price);
            Some(moved)
        } else {
            None
        }
    }

    pub fn reference(&self, symbol: &str) -> Option<f64> {
        self.refs.get(symbol).copied()
    }
}

/// Previous close implied by a day-change percentage.
pub fn implied_previous_close(price: f64, change_percent: Option<f64>) -> Option<f64> {
    let pct = change_percent?;
    let factor = 1.0 + pct / 100.0;
    (factor > 0.0).then(|| price / factor)
}

/// Every trigger that fires for one valued holding on this tick.
pub fn holding_alerts(
    row: &HoldingSummary,
    thresholds: &AlertThresholds,
    baselines: &mut PriceBaselines,
) -> Vec<HoldingAlert> {
    let mut alerts = Vec::new();

    let opening = implied_previous_close(row.current_price, row.change_today);
    if let Some(moved) = baselines.check(
        &row.symbol,
        row.current_price,
        opening,
        thresholds.price_move_pct,
    ) {
        alerts.push(HoldingAlert {
            kind: HoldingAlertKind::PriceChange,
            percent: moved,
        });
    }
    if row.profit_percent >= thresholds.profit_pct {
        alerts.push(HoldingAlert {
            kind: HoldingAlertKind::ProfitTarget,
            percent: row.profit_percent,
        });
    }
    if row.profit_percent <= thresholds.loss_pct {
        alerts.push(HoldingAlert {
            kind: HoldingAlertKind::LossAlert,
            percent: row.profit_percent,
        });
    }
    alerts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockAlertKind {
    AiSignal,
    PriceBreakout,
    VolumeSpike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    #[serde(rename = "type")]
    pub kind: StockAlertKind,
    pub message: String,
    pub urgency: Priority,
}

/// Point-in-time alert check for one symbol; nothing is sent.
pub async fn stock_alerts(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    breakout_price: Option<f64>,
) -> Result<Vec<StockAlert>> {
    let indicators = technical_indicators(provider, symbol).await?;
    let financials = provider.financials(&indicators.symbol).await?;
    let score = composite::evaluate(&indicators.symbol, &indicators, &financials);
    Ok(evaluate_stock_alerts(&indicators, &score, breakout_price))
}

pub fn evaluate_stock_alerts(
    ind: &TechnicalIndicators,
    score: &ScoreBreakdown,
    breakout_price: Option<f64>,
) -> Vec<StockAlert> {
    let symbol = &ind.symbol;
    let mut alerts = Vec::new();

    if score.total_score >= AI_SIGNAL_MIN_SCORE && score.recommendation == Recommendation::StrongBuy
    {
        alerts.push(StockAlert {
            kind: StockAlertKind::AiSignal,
            message: format!(
                "🚀 Strong Buy Signal for {symbol}! AI Score: {:.1}",
                score.total_score
            ),
            urgency: Priority::High,
        });
    }
    if let Some(level) = breakout_price.filter(|level| ind.price > *level) {
        alerts.push(StockAlert {
            kind: StockAlertKind::PriceBreakout,
            message: format!("📈 {symbol} broke resistance at ${level:.2}"),
            urgency: Priority::Medium,
        });
    }
    if ind.volume_ratio.is_some_and(|r| r > VOLUME_SPIKE_RATIO) {
        alerts.push(StockAlert {
            kind: StockAlertKind::VolumeSpike,
            message: format!("💹 Unusual volume detected for {symbol}"),
            urgency: Priority::Medium,
        });
    }
    alerts
}

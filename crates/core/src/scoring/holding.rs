use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::market::FinancialInfo;
use crate::domain::recommendation::{
    HoldingScore, HoldingScoreBreakdown, Recommendation, Trend,
};
use crate::domain::signal::{SignalAction, TechnicalIndicators};
use crate::indicators::technical_indicators;
use crate::market::MarketDataProvider;
use crate::scoring::clamp_score;

const BASELINE: f64 = 50.0;

/// Score plus the indicators it was derived from, so callers can build
/// reasoning and urgency without refetching.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingAssessment {
    pub score: HoldingScore,
    pub indicators: TechnicalIndicators,
}

/// Integer 0..=100 score used by the daily portfolio report.
#[derive(Clone)]
pub struct HoldingScorer {
    provider: Arc<dyn MarketDataProvider>,
}

impl HoldingScorer {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    pub async fn assess(&self, symbol: &str) -> Result<HoldingAssessment> {
        let indicators = technical_indicators(self.provider.as_ref(), symbol).await?;
        let financials = self
            .provider
            .financials(&indicators.symbol)
            .await
            .with_context(|| format!("Failed to score holding {}", indicators.symbol))?;

        Ok(HoldingAssessment {
            score: evaluate(&indicators, &financials),
            indicators,
        })
    }
}

pub fn evaluate(ind: &TechnicalIndicators, fin: &FinancialInfo) -> HoldingScore {
    let mut score = BASELINE;

    // Only the plain BUY/SELL signals move this score.
    match ind.signal.action {
        SignalAction::Buy => score += 20.0,
        SignalAction::Sell => score -= 20.0,
        _ => {}
    }

    match ind.rsi {
        Some(rsi) if rsi < 30.0 => score += 10.0,
        Some(rsi) if rsi > 70.0 => score -= 10.0,
        _ => {}
    }

    if let (Some(ma20), Some(ma50)) = (ind.ma20, ind.ma50) {
        if ind.price > ma20 && ma20 > ma50 {
            score += 10.0;
        } else if ind.price < ma20 && ma20 < ma50 {
            score -= 10.0;
        }
    }

    let stats = &fin.key_statistics;
    match stats.pe_ratio {
        Some(pe) if pe < 15.0 => score += 10.0,
        Some(pe) if pe > 40.0 => score -= 10.0,
        _ => {}
    }
    if let (Some(fwd), Some(pe)) = (stats.forward_pe, stats.pe_ratio) {
        if fwd < pe {
            score += 10.0;
        }
    }

    let vs_ma20 = ind.price_vs_ma20();
    match vs_ma20 {
        Some(v) if v > 5.0 => score += 10.0,
        Some(v) if v < -5.0 => score -= 10.0,
        _ => {}
    }

    let total = clamp_score(score).round() as u8;
    HoldingScore {
        total_score: total,
        recommendation: recommendation_for(total),
        breakdown: HoldingScoreBreakdown {
            technical: ind.signal.action,
            rsi: ind.rsi,
            trend: if vs_ma20.is_some_and(|v| v > 0.0) {
                Trend::Bullish
            } else {
                Trend::Bearish
            },
        },
    }
}

pub fn recommendation_for(score: u8) -> Recommendation {
    match score {
        75.. => Recommendation::StrongBuy,
        60..=74 => Recommendation::Buy,
        40..=59 => Recommendation::Hold,
        25..=39 => Recommendation::Sell,
        _ => Recommendation::StrongSell,
    }
}

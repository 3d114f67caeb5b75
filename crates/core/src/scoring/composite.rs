use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::market::FinancialInfo;
use crate::domain::recommendation::{Confidence, Recommendation, ScoreBreakdown, SubScores};
use crate::domain::signal::TechnicalIndicators;
use crate::indicators::technical_indicators;
use crate::market::MarketDataProvider;
use crate::scoring::clamp_score;

const BASELINE: f64 = 50.0;

pub const WEIGHT_TECHNICAL: f64 = 0.25;
pub const WEIGHT_FUNDAMENTAL: f64 = 0.25;
pub const WEIGHT_SENTIMENT: f64 = 0.20;
pub const WEIGHT_MOMENTUM: f64 = 0.15;
pub const WEIGHT_RISK: f64 = 0.15;

/// Weighted multi-factor score for a single symbol.
#[derive(Clone)]
pub struct ScoringEngine {
    provider: Arc<dyn MarketDataProvider>,
}

impl ScoringEngine {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    pub async fn score(&self, symbol: &str) -> Result<ScoreBreakdown> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let indicators = technical_indicators(self.provider.as_ref(), &symbol)
            .await
            .with_context(|| format!("Failed to score {symbol}"))?;
        let financials = self
            .provider
            .financials(&symbol)
            .await
            .with_context(|| format!("Failed to score {symbol}"))?;

        Ok(evaluate(&symbol, &indicators, &financials))
    }
}

pub fn evaluate(
    symbol: &str,
    indicators: &TechnicalIndicators,
    financials: &FinancialInfo,
) -> ScoreBreakdown {
    let scores = SubScores {
        technical: technical_score(indicators),
        fundamental: fundamental_score(financials),
        sentiment: sentiment_score(indicators.price, financials),
        momentum: momentum_score(indicators),
        risk: risk_score(indicators, financials),
    };
    combine(symbol, scores)
}

/// Weighted total, recommendation and confidence for already-computed sub-scores.
pub fn combine(symbol: &str, scores: SubScores) -> ScoreBreakdown {
    let total_score = scores.technical * WEIGHT_TECHNICAL
        + scores.fundamental * WEIGHT_FUNDAMENTAL
        + scores.sentiment * WEIGHT_SENTIMENT
        + scores.momentum * WEIGHT_MOMENTUM
        + scores.risk * WEIGHT_RISK;

    ScoreBreakdown {
        symbol: symbol.to_string(),
        scores,
        total_score,
        recommendation: recommendation_for(total_score),
        confidence: confidence_for(&scores),
    }
}

pub fn recommendation_for(total: f64) -> Recommendation {
    if total >= 80.0 {
        Recommendation::StrongBuy
    } else if total >= 65.0 {
        Recommendation::Buy
    } else if total >= 35.0 {
        Recommendation::Hold
    } else if total >= 20.0 {
        Recommendation::Sell
    } else {
        Recommendation::StrongSell
    }
}

/// Population variance of the sub-scores: tight agreement means high confidence.
pub fn confidence_for(scores: &SubScores) -> Confidence {
    let values = scores.as_array();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    if variance < 100.0 {
        Confidence::High
    } else if variance < 300.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

pub fn technical_score(ind: &TechnicalIndicators) -> f64 {
    let mut score = BASELINE;
    match ind.rsi {
        Some(rsi) if rsi < 30.0 => score += 20.0,
        Some(rsi) if rsi > 70.0 => score -= 20.0,
        _ => {}
    }
    if ind.golden_cross() {
        score += 15.0;
    }
    if ind.volume_ratio.is_some_and(|r| r > 1.5) {
        score += 10.0;
    }
    clamp_score(score)
}

pub fn fundamental_score(fin: &FinancialInfo) -> f64 {
    let stats = &fin.key_statistics;
    let mut score = BASELINE;
    match stats.pe_ratio {
        Some(pe) if pe < 15.0 => score += 20.0,
        Some(pe) if pe > 35.0 => score -= 20.0,
        _ => {}
    }
    if stats.peg_ratio.is_some_and(|peg| peg < 1.0) {
        score += 15.0;
    }
    if stats.profit_margins.is_some_and(|m| m > 0.15) {
        score += 15.0;
    }
    clamp_score(score)
}

/// Analyst consensus (1 = strong buy .. 5 = sell) and target-price upside.
pub fn sentiment_score(price: f64, fin: &FinancialInfo) -> f64 {
    let data = &fin.financial_data;
    let mut score = BASELINE;
    match data.recommendation_mean {
        Some(mean) if mean <= 2.0 => score += 20.0,
        Some(mean) if mean >= 3.5 => score -= 20.0,
        _ => {}
    }

    let current = data.current_price.unwrap_or(price);
    if let Some(target) = data.target_mean_price {
        if current > 0.0 {
            let upside = (target - current) / current * 100.0;
            if upside > 15.0 {
                score += 15.0;
            } else if upside < 0.0 {
                score -= 15.0;
            }
        }
    }
    clamp_score(score)
}

/// Distance from the 20-day average, confirmed by above-average volume.
pub fn momentum_score(ind: &TechnicalIndicators) -> f64 {
    let mut score = BASELINE;
    let Some(vs_ma20) = ind.price_vs_ma20() else {
        return score;
    };

    if vs_ma20 > 5.0 {
        score += 15.0;
    } else if vs_ma20 < -5.0 {
        score -= 15.0;
    }

    if ind.volume_ratio.is_some_and(|r| r > 1.5) {
        if vs_ma20 > 0.0 {
            score += 10.0;
        } else if vs_ma20 < 0.0 {
            score -= 10.0;
        }
    }
    clamp_score(score)
}

/// Higher is safer: low beta helps, high beta and RSI extremes hurt.
pub fn risk_score(ind: &TechnicalIndicators, fin: &FinancialInfo) -> f64 {
    let mut score = BASELINE;
    match fin.key_statistics.beta {
        Some(beta) if beta < 1.0 => score += 15.0,
        Some(beta) if beta > 1.5 => score -= 15.0,
        _ => {}
    }
    if ind.rsi.is_some_and(|rsi| rsi > 80.0 || rsi < 20.0) {
        score -= 10.0;
    }
    clamp_score(score)
}

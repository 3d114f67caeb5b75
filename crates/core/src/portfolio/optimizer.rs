use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::Utc;

use crate::domain::recommendation::ScoreBreakdown;
use crate::domain::report::{PortfolioRecommendation, RecommendedStock, RiskTolerance};
use crate::indicators::technical_indicators;
use crate::market::nasdaq::NASDAQ_100_SYMBOLS;
use crate::market::MarketDataProvider;
use crate::scoring::composite;

const PICKS_PER_SECTOR: usize = 2;
const MIN_PICK_SCORE: f64 = 60.0;

pub const TECHNOLOGY: &str = "Technology";
pub const HEALTHCARE: &str = "Healthcare";
pub const CONSUMER: &str = "Consumer";
pub const FINANCIAL: &str = "Financial";

/// Target weight per sector bucket.
pub fn allocation(tolerance: RiskTolerance) -> [(&'static str, f64); 4] {
    let [tech, health, consumer, financial] = match tolerance {
        RiskTolerance::Conservative => [0.20, 0.30, 0.30, 0.20],
        RiskTolerance::Moderate => [0.35, 0.25, 0.25, 0.15],
        RiskTolerance::Aggressive => [0.50, 0.20, 0.20, 0.10],
    };
    [
        (TECHNOLOGY, tech),
        (HEALTHCARE, health),
        (CONSUMER, consumer),
        (FINANCIAL, financial),
    ]
}

/// Maps an upstream sector name onto one of the four allocation buckets.
pub fn bucket_for(sector: &str) -> Option<&'static str> {
    match sector {
        "Technology" | "Communication Services" => Some(TECHNOLOGY),
        "Healthcare" => Some(HEALTHCARE),
        "Consumer Cyclical" | "Consumer Defensive" => Some(CONSUMER),
        "Financial Services" => Some(FINANCIAL),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bucket: &'static str,
    pub price: f64,
    pub score: ScoreBreakdown,
}

/// Suggests a NASDAQ-100 portfolio for a cash budget.
#[derive(Clone)]
pub struct PortfolioOptimizer {
    provider: Arc<dyn MarketDataProvider>,
}

impl PortfolioOptimizer {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    pub async fn recommend_portfolio(
        &self,
        budget: f64,
        tolerance: RiskTolerance,
    ) -> Result<PortfolioRecommendation> {
        ensure!(budget.is_finite() && budget > 0.0, "budget must be a positive amount");

        let mut candidates = Vec::new();
        for symbol in NASDAQ_100_SYMBOLS {
            match self.candidate(symbol).await {
                Ok(Some(c)) => candidates.push(c),
                Ok(None) => tracing::debug!(%symbol, "no allocation bucket for sector"),
                Err(err) => {
                    tracing::warn!(%symbol, error = %format!("{err:#}"), "skipping optimizer candidate");
                }
            }
        }

        tracing::info!(
            budget,
            tolerance = ?tolerance,
            candidates = candidates.len(),
            "building portfolio recommendation"
        );
        Ok(allocate(budget, tolerance, candidates))
    }

    async fn candidate(&self, symbol: &str) -> Result<Option<Candidate>> {
        let Some(bucket) = self
            .provider
            .sector(symbol)
            .await?
            .as_deref()
            .and_then(bucket_for)
        else {
            return Ok(None);
        };

        let indicators = technical_indicators(self.provider.as_ref(), symbol).await?;
        let financials = self
            .provider
            .financials(symbol)
            .await
            .with_context(|| format!("Failed to score {symbol}"))?;

        Ok(Some(Candidate {
            bucket,
            price: indicators.price,
            score: composite::evaluate(symbol, &indicators, &financials),
        }))
    }
}

/// Picks the best two names per bucket that clear the score bar and sizes
/// each at an equal share of the bucket's budget.
pub fn allocate(
    budget: f64,
    tolerance: RiskTolerance,
    candidates: Vec<Candidate>,
) -> PortfolioRecommendation {
    let mut stocks = Vec::new();

    for (bucket, weight) in allocation(tolerance) {
        let mut picks: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.bucket == bucket && c.price > 0.0)
            .collect();
        picks.sort_by(|a, b| b.score.total_score.total_cmp(&a.score.total_score));
        picks.truncate(PICKS_PER_SECTOR);
        picks.retain(|c| c.score.total_score >= MIN_PICK_SCORE);

        let slice = budget * weight / picks.len().max(1) as f64;
        for pick in picks {
            let shares = (slice / pick.price).floor() as u64;
            if shares == 0 {
                continue;
            }
            stocks.push(RecommendedStock {
                symbol: pick.score.symbol.clone(),
                sector: bucket.to_string(),
                shares,
                price: pick.price,
                value: shares as f64 * pick.price,
                ai_score: pick.score.total_score,
                recommendation: pick.score.recommendation,
            });
        }
    }

    let total_value: f64 = stocks.iter().map(|s| s.value).sum();
    let risk_score = risk_score(&stocks, &candidates, total_value);

    PortfolioRecommendation {
        budget,
        risk_tolerance: tolerance,
        stocks,
        total_value,
        risk_score,
        generated_at: Utc::now(),
    }
}

/// Value-weighted riskiness on a 0..10 scale, from each pick's risk sub-score.
fn risk_score(stocks: &[RecommendedStock], candidates: &[Candidate], total: f64) -> Option<f64> {
    if total <= 0.0 {
        return None;
    }
    let weighted: f64 = stocks
        .iter()
        .filter_map(|s| {
            let c = candidates.iter().find(|c| c.score.symbol == s.symbol)?;
            Some(s.value * (100.0 - c.score.scores.risk) / 10.0)
        })
        .sum();
    Some(weighted / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{Recommendation, SubScores};
    use crate::test_support::{quote, FakeProvider};

    fn cand(symbol: &str, bucket: &'static str, price: f64, level: f64, risk: f64) -> Candidate {
        Candidate {
            bucket,
            price,
            score: composite::combine(
                symbol,
                SubScores {
                    technical: level,
                    fundamental: level,
                    sentiment: level,
                    momentum: level,
                    risk,
                },
            ),
        }
    }

    #[test]
    fn sector_mapping() {
        assert_eq!(bucket_for("Communication Services"), Some(TECHNOLOGY));
        assert_eq!(bucket_for("Consumer Defensive"), Some(CONSUMER));
        assert_eq!(bucket_for("Financial Services"), Some(FINANCIAL));
        assert_eq!(bucket_for("Utilities"), None);
        assert_eq!(RiskTolerance::parse_lenient("yolo"), RiskTolerance::Moderate);
    }

    #[test]
    fn allocations_sum_to_one() {
        for t in [
            RiskTolerance::Conservative,
            RiskTolerance::Moderate,
            RiskTolerance::Aggressive,
        ] {
            let sum: f64 = allocation(t).iter().map(|(_, w)| w).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn top_two_per_bucket_above_bar() {
        let candidates = vec![
            cand("AAPL", TECHNOLOGY, 100.0, 80.0, 80.0),
            cand("MSFT", TECHNOLOGY, 200.0, 70.0, 70.0),
            cand("NVDA", TECHNOLOGY, 50.0, 65.0, 60.0),
            cand("AMGN", HEALTHCARE, 100.0, 40.0, 40.0),
            cand("PEP", CONSUMER, 150.0, 75.0, 50.0),
        ];
        let rec = allocate(10_000.0, RiskTolerance::Moderate, candidates);

        let symbols: Vec<_> = rec.stocks.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "PEP"]);

        // technology gets 3500 split over two picks
        assert_eq!(rec.stocks[0].shares, 17);
        assert_eq!(rec.stocks[1].shares, 8);
        // consumer gets 2500 for one pick
        assert_eq!(rec.stocks[2].shares, 16);
        assert_eq!(rec.stocks[2].recommendation, Recommendation::Buy);

        let expected_total = 1700.0 + 1600.0 + 2400.0;
        assert_eq!(rec.total_value, expected_total);
        let expected_risk =
            (1700.0 * 2.0 + 1600.0 * 3.0 + 2400.0 * 5.0) / expected_total;
        assert!((rec.risk_score.unwrap() - expected_risk).abs() < 1e-9);
    }

    #[test]
    fn nothing_qualifies() {
        let rec = allocate(
            1_000.0,
            RiskTolerance::Aggressive,
            vec![cand("AAPL", TECHNOLOGY, 100.0, 30.0, 30.0)],
        );
        assert!(rec.stocks.is_empty());
        assert_eq!(rec.total_value, 0.0);
        assert_eq!(rec.risk_score, None);
    }

    #[tokio::test]
    async fn rejects_non_positive_budget() {
        let optimizer = PortfolioOptimizer::new(Arc::new(FakeProvider::default()));
        assert!(optimizer
            .recommend_portfolio(0.0, RiskTolerance::Moderate)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn skips_symbols_without_data() {
        let provider = Arc::new(FakeProvider::default());
        provider.set_quote(quote("AAPL", 100.0, Some(1.0)));
        provider.set_sector("AAPL", "Technology");
        // no history for AAPL: scoring fails and the symbol is skipped
        let rec = PortfolioOptimizer::new(provider)
            .recommend_portfolio(5_000.0, RiskTolerance::Conservative)
            .await
            .unwrap();
        assert!(rec.stocks.is_empty());
        assert_eq!(rec.risk_tolerance, RiskTolerance::Conservative);
    }
}

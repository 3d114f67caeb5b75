use std::sync::Arc;

use chrono::{Local, Utc};

use crate::domain::market::MarketMover;
use crate::domain::portfolio::PortfolioSummary;
use crate::domain::recommendation::Recommendation;
use crate::domain::report::{
    DailyReport, EnrichedHolding, HoldingRecommendation, PortfolioAnalysis, TopPick,
};
use crate::market::nasdaq::{build_overview, fetch_ranked_movers};
use crate::market::MarketDataProvider;
use crate::portfolio::rebalance::{
    action_items, holding_recommendation, performance_summary, rebalancing_plan,
    sector_distribution, UNKNOWN_SECTOR,
};
use crate::portfolio::store::SharedPortfolio;
use crate::portfolio::summary::summarize;
use crate::scoring::HoldingScorer;

const TOP_PICK_CANDIDATES: usize = 10;
const TOP_PICKS: usize = 5;

/// Builds the daily portfolio report.
#[derive(Clone)]
pub struct PortfolioAnalyzer {
    portfolio: SharedPortfolio,
    provider: Arc<dyn MarketDataProvider>,
    scorer: HoldingScorer,
}

impl PortfolioAnalyzer {
    pub fn new(portfolio: SharedPortfolio, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            portfolio,
            scorer: HoldingScorer::new(provider.clone()),
            provider,
        }
    }

    /// Reloads the portfolio from disk and runs every stage of the report.
    /// Upstream failures degrade individual sections instead of failing the report.
    pub async fn generate_daily_report(&self) -> DailyReport {
        tracing::info!("generating daily portfolio report");

        let holdings = {
            let mut store = self.portfolio.lock().await;
            store.load().await.to_vec()
        };
        let summary = summarize(&holdings, self.provider.as_ref()).await;
        let (portfolio, recommendations) = self.analyze(summary).await;
        let rebalancing = rebalancing_plan(&portfolio);

        let (market_overview, top_picks) = match fetch_ranked_movers(self.provider.as_ref()).await {
            Ok(ranked) => (
                Some(build_overview(&ranked)),
                self.top_picks(&ranked.gainers).await,
            ),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "market overview unavailable; report has no top picks");
                (None, Vec::new())
            }
        };

        let action_items = action_items(&recommendations, &rebalancing);

        tracing::info!(
            holdings = portfolio.holdings.len(),
            recommendations = recommendations.len(),
            top_picks = top_picks.len(),
            action_items = action_items.len(),
            "daily report ready"
        );

        DailyReport {
            date: Local::now().date_naive(),
            generated_at: Utc::now(),
            portfolio,
            recommendations,
            rebalancing,
            top_picks,
            market_overview,
            action_items,
        }
    }

    /// Enriches each valued holding with its score and sector.
    pub async fn analyze(
        &self,
        summary: PortfolioSummary,
    ) -> (PortfolioAnalysis, Vec<HoldingRecommendation>) {
        if summary.is_empty() {
            return (PortfolioAnalysis::empty(), Vec::new());
        }

        let mut holdings = Vec::with_capacity(summary.holdings.len());
        let mut recommendations = Vec::new();

        for row in summary.holdings {
            let (ai_score, recommendation) = match self.scorer.assess(&row.symbol).await {
                Ok(assessment) => {
                    recommendations.push(holding_recommendation(&row.symbol, &assessment));
                    (
                        Some(assessment.score.total_score),
                        assessment.score.recommendation,
                    )
                }
                Err(err) => {
                    tracing::warn!(symbol = %row.symbol, error = %format!("{err:#}"), "holding enrichment failed");
                    (None, Recommendation::Unknown)
                }
            };

            let sector = self.sector_for(&row.symbol).await;
            holdings.push(EnrichedHolding {
                summary: row,
                sector,
                ai_score,
                recommendation,
            });
        }

        recommendations.sort_by(|a, b| b.ai_score.cmp(&a.ai_score));

        let analysis = PortfolioAnalysis {
            is_empty: false,
            totals: summary.totals,
            sector_analysis: sector_distribution(&holdings),
            performance_summary: performance_summary(&holdings),
            holdings,
        };
        (analysis, recommendations)
    }

    async fn sector_for(&self, symbol: &str) -> String {
        match self.provider.sector(symbol).await {
            Ok(Some(sector)) => sector,
            Ok(None) => UNKNOWN_SECTOR.to_string(),
            Err(err) => {
                tracing::warn!(symbol = %symbol, error = %format!("{err:#}"), "sector lookup failed");
                UNKNOWN_SECTOR.to_string()
            }
        }
    }

    /// Best-scoring names among today's leading gainers.
    pub async fn top_picks(&self, gainers: &[MarketMover]) -> Vec<TopPick> {
        let mut picks = Vec::new();
        for mover in gainers.iter().take(TOP_PICK_CANDIDATES) {
            match self.scorer.assess(&mover.symbol).await {
                Ok(a) => picks.push(TopPick {
                    symbol: mover.symbol.clone(),
                    name: mover.name.clone(),
                    price: mover.price,
                    change_percent: mover.change_percent,
                    ai_score: a.score.total_score,
                    recommendation: a.score.recommendation,
                }),
                Err(err) => {
                    tracing::warn!(symbol = %mover.symbol, error = %format!("{err:#}"), "skipping top pick candidate");
                }
            }
        }

        picks.sort_by(|a, b| b.ai_score.cmp(&a.ai_score));
        picks.truncate(TOP_PICKS);
        picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::HoldingRequest;
    use crate::domain::report::{Priority, SuggestionKind};
    use crate::market::nasdaq::NASDAQ_100_SYMBOLS;
    use crate::portfolio::store::PortfolioStore;
    use crate::test_support::{financials, quote, FakeProvider};

    async fn store_with(dir: &tempfile::TempDir, rows: &[(&str, f64, f64)]) -> SharedPortfolio {
        let mut store = PortfolioStore::open(dir.path().join("p.json")).await;
        for (symbol, shares, price) in rows {
            store
                .add_stock(HoldingRequest {
                    symbol: symbol.to_string(),
                    shares: *shares,
                    purchase_price: *price,
                })
                .await
                .unwrap();
        }
        store.into_shared()
    }

    fn rising() -> Vec<f64> {
        (1..=60).map(|i| 100.0 + i as f64 * 0.5 + if i % 2 == 0 { 0.0 } else { -0.8 }).collect()
    }

    #[tokio::test]
    async fn empty_portfolio_report() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let analyzer = PortfolioAnalyzer::new(store_with(&dir, &[]).await, provider);

        let report = analyzer.generate_daily_report().await;
        assert!(report.portfolio.is_empty);
        assert!(report.recommendations.is_empty());
        assert!(!report.rebalancing.needed);
        assert!(report.action_items.is_empty());
        // no quotes configured: overview is built from nothing
        assert!(report.top_picks.is_empty());
    }

    #[tokio::test]
    async fn mixed_portfolio_report() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.set_quote(quote("INTC", 85.0, Some(-1.0)));
        provider.set_quote(quote("NVDA", 125.0, Some(2.0)));
        provider.set_quote(quote("PEP", 100.0, Some(0.0)));
        for s in ["INTC", "NVDA", "PEP"] {
            provider.set_history(s, &rising(), &vec![1000.0; 60]);
        }
        provider.set_financials(financials("NVDA", Some(45.0), Some(30.0)));
        provider.set_sector("NVDA", "Technology");
        provider.set_sector("INTC", "Technology");
        provider.fail("PEP");

        let portfolio = store_with(
            &dir,
            &[("INTC", 10.0, 100.0), ("NVDA", 10.0, 100.0), ("PEP", 10.0, 100.0)],
        )
        .await;
        let analyzer = PortfolioAnalyzer::new(portfolio, provider);
        let report = analyzer.generate_daily_report().await;

        // PEP's quote fails, so it is dropped from the summary entirely.
        assert_eq!(report.portfolio.holdings.len(), 2);
        assert_eq!(report.portfolio.sector_analysis.len(), 1);
        assert_eq!(report.portfolio.sector_analysis[0].sector, "Technology");

        let kinds: Vec<_> = report.rebalancing.suggestions.iter().map(|s| s.kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == SuggestionKind::ReviewLosses).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == SuggestionKind::TakeProfit).count(), 1);
        assert!(report
            .action_items
            .iter()
            .any(|a| a.priority == Priority::High && a.reason == "REVIEW_LOSSES"));

        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].ai_score >= report.recommendations[1].ai_score);
    }

    #[tokio::test]
    async fn enrichment_failure_keeps_holding_unscored() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.set_quote(quote("AMD", 150.0, Some(1.0)));
        // no history => indicators fail

        let portfolio = store_with(&dir, &[("AMD", 1.0, 100.0)]).await;
        let analyzer = PortfolioAnalyzer::new(portfolio, provider);
        let report = analyzer.generate_daily_report().await;

        let amd = &report.portfolio.holdings[0];
        assert_eq!(amd.ai_score, None);
        assert_eq!(amd.recommendation, Recommendation::Unknown);
        assert_eq!(amd.sector, UNKNOWN_SECTOR);
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn top_picks_are_scored_gainers() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        for (i, s) in NASDAQ_100_SYMBOLS.iter().take(10).enumerate() {
            provider.set_quote(quote(s, 100.0, Some(i as f64 - 2.0)));
            provider.set_history(s, &rising(), &vec![1000.0; 60]);
        }
        provider.fail("NVDA");

        let analyzer = PortfolioAnalyzer::new(store_with(&dir, &[]).await, provider);
        let report = analyzer.generate_daily_report().await;

        let overview = report.market_overview.unwrap();
        assert_eq!(overview.top_gainers.len(), 5);
        assert!(report.top_picks.len() <= 5);
        assert!(!report.top_picks.iter().any(|p| p.symbol == "NVDA"));
        assert!(report
            .top_picks
            .windows(2)
            .all(|w| w[0].ai_score >= w[1].ai_score));
    }
}

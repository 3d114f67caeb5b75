use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::market::{MarketMover, MarketOverview, MarketTrend, Quote};
use crate::market::MarketDataProvider;

/// Largest NASDAQ-100 constituents, in the order the overview samples them.
pub const NASDAQ_100_SYMBOLS: [&str; 24] = [
    "AAPL", "MSFT", "NVDA", "AMZN", "META", "GOOGL", "GOOG", "TSLA", "AVGO", "PEP", "COST", "ASML",
    "AZN", "CSCO", "TMUS", "ADBE", "NFLX", "QCOM", "INTC", "AMD", "INTU", "AMGN", "ISRG", "AMAT",
];

/// How many leading symbols the overview quotes.
pub const OVERVIEW_SAMPLE: usize = 10;
const OVERVIEW_TOP_N: usize = 5;

/// All sampled quotes split by direction, each side sorted strongest-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedMovers {
    pub gainers: Vec<MarketMover>,
    pub losers: Vec<MarketMover>,
}

pub fn rank_movers(quotes: &[Quote]) -> RankedMovers {
    let mut ranked = RankedMovers::default();
    for q in quotes {
        let change_percent = q.change_percent.unwrap_or(0.0);
        let mover = MarketMover {
            symbol: q.symbol.clone(),
            name: q.name.clone(),
            price: q.price,
            change_percent,
        };
        if change_percent > 0.0 {
            ranked.gainers.push(mover);
        } else {
            ranked.losers.push(mover);
        }
    }

    ranked
        .gainers
        .sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
    ranked
        .losers
        .sort_by(|a, b| a.change_percent.total_cmp(&b.change_percent));
    ranked
}

pub fn build_overview(ranked: &RankedMovers) -> MarketOverview {
    let market_trend = if ranked.gainers.len() > ranked.losers.len() {
        MarketTrend::Bullish
    } else {
        MarketTrend::Bearish
    };

    MarketOverview {
        market_trend,
        top_gainers: ranked.gainers.iter().take(OVERVIEW_TOP_N).cloned().collect(),
        top_losers: ranked.losers.iter().take(OVERVIEW_TOP_N).cloned().collect(),
        timestamp: Utc::now(),
    }
}

pub async fn fetch_ranked_movers(provider: &dyn MarketDataProvider) -> Result<RankedMovers> {
    let symbols: Vec<String> = NASDAQ_100_SYMBOLS
        .iter()
        .take(OVERVIEW_SAMPLE)
        .map(|s| s.to_string())
        .collect();

    let quotes = provider
        .quotes(&symbols)
        .await
        .context("Failed to fetch NASDAQ-100 overview")?;
    Ok(rank_movers(&quotes))
}

pub async fn market_overview(provider: &dyn MarketDataProvider) -> Result<MarketOverview> {
    let ranked = fetch_ranked_movers(provider).await?;
    Ok(build_overview(&ranked))
}

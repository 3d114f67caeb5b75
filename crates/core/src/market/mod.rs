pub mod alphavantage;
pub mod error;
pub mod models;
pub mod nasdaq;
pub mod yahoo;

use anyhow::Result;

use crate::domain::market::{FinancialInfo, HistoricalSeries, HistoryPeriod, Quote};

/// Source of quotes, price history and fundamentals.
///
/// Implementations wrap their own failures with the symbol involved; nothing
/// here is retried.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Quotes for several symbols. Symbols the upstream does not know are
    /// omitted from the result rather than failing the batch.
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>>;

    async fn history(&self, symbol: &str, period: HistoryPeriod) -> Result<HistoricalSeries>;

    async fn financials(&self, symbol: &str) -> Result<FinancialInfo>;

    /// Sector classification, `None` when the upstream has none.
    async fn sector(&self, symbol: &str) -> Result<Option<String>>;
}

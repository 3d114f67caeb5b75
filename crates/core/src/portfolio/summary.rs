use crate::domain::portfolio::{percent_of, Holding, HoldingSummary, PortfolioSummary, PortfolioTotals};
use crate::market::MarketDataProvider;

/// Values every holding at its current quote. Holdings whose quote fails are
/// logged and left out of both the rows and the totals.
pub async fn summarize(holdings: &[Holding], provider: &dyn MarketDataProvider) -> PortfolioSummary {
    let mut rows = Vec::with_capacity(holdings.len());

    for holding in holdings {
        match provider.quote(&holding.symbol).await {
            Ok(quote) => rows.push(value_holding(holding, quote.price, quote.change_percent)),
            Err(err) => {
                tracing::warn!(symbol = %holding.symbol, error = %format!("{err:#}"), "skipping holding without quote");
            }
        }
    }

    let totals = totals_for(&rows);
    PortfolioSummary {
        holdings: rows,
        totals,
    }
}

pub fn value_holding(holding: &Holding, price: f64, change_today: Option<f64>) -> HoldingSummary {
    let invested = holding.shares * holding.purchase_price;
    let current_value = holding.shares * price;
    let profit = current_value - invested;

    HoldingSummary {
        symbol: holding.symbol.clone(),
        shares: holding.shares,
        purchase_price: holding.purchase_price,
        current_price: price,
        invested,
        current_value,
        profit,
        profit_percent: percent_of(profit, invested),
        change_today,
    }
}

pub fn totals_for(rows: &[HoldingSummary]) -> PortfolioTotals {
    let total_invested: f64 = rows.iter().map(|r| r.invested).sum();
    let total_current_value: f64 = rows.iter().map(|r| r.current_value).sum();
    let total_profit = total_current_value - total_invested;

    PortfolioTotals {
        total_invested,
        total_current_value,
        total_profit,
        total_profit_percent: percent_of(total_profit, total_invested),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{holding, quote, FakeProvider};

    #[tokio::test]
    async fn values_holdings_and_skips_failed_quotes() {
        let provider = FakeProvider::default();
        provider.set_quote(quote("AAPL", 120.0, Some(1.5)));
        provider.set_quote(quote("MSFT", 270.0, Some(-0.4)));
        provider.fail("TSLA");

        let holdings = vec![
            holding("AAPL", 10.0, 100.0),
            holding("TSLA", 3.0, 200.0),
            holding("MSFT", 2.0, 300.0),
        ];
        let s = summarize(&holdings, &provider).await;

        assert_eq!(s.holdings.len(), 2);
        let aapl = &s.holdings[0];
        assert_eq!(aapl.invested, 1000.0);
        assert_eq!(aapl.current_value, 1200.0);
        assert_eq!(aapl.profit, 200.0);
        assert_eq!(aapl.profit_percent, 20.0);
        assert_eq!(aapl.change_today, Some(1.5));

        assert_eq!(s.totals.total_invested, 1600.0);
        assert_eq!(s.totals.total_current_value, 1740.0);
        assert_eq!(s.totals.total_profit, 140.0);
        assert!((s.totals.total_profit_percent - 8.75).abs() < 1e-9);
    }

    #[test]
    fn zero_cost_basis_reports_zero_percent() {
        let row = value_holding(&holding("GIFT", 5.0, 0.0), 10.0, None);
        assert_eq!(row.profit, 50.0);
        assert_eq!(row.profit_percent, 0.0);
        assert_eq!(totals_for(&[]).total_profit_percent, 0.0);
    }
}

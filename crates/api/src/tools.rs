use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use stockpilot_core::alerts::triggers::stock_alerts;
use stockpilot_core::alerts::{
    AlertThresholds, DailyReportOptions, MonitorHandle, MonitorRegistry, PortfolioMonitorOptions,
    ReportContent, StockWatchOptions,
};
use stockpilot_core::config::Settings;
use stockpilot_core::domain::contract::{normalize_symbol, HoldingRequest};
use stockpilot_core::domain::market::{HistoryPeriod, QuoteBrief};
use stockpilot_core::domain::report::RiskTolerance;
use stockpilot_core::indicators::technical_indicators;
use stockpilot_core::market::alphavantage::AlphaVantageClient;
use stockpilot_core::market::nasdaq::market_overview;
use stockpilot_core::market::yahoo::YahooProvider;
use stockpilot_core::market::MarketDataProvider;
use stockpilot_core::notify::Notifier;
use stockpilot_core::portfolio::summary::summarize;
use stockpilot_core::portfolio::{
    PortfolioAnalyzer, PortfolioOptimizer, PortfolioStore, SharedPortfolio,
};
use stockpilot_core::scoring::composite::ScoringEngine;
use stockpilot_core::time::DailyTime;

use crate::protocol::{CallToolParams, CallToolResult, ToolDefinition};

/// Everything a tool call can touch. One per process.
pub struct AppState {
    provider: Arc<dyn MarketDataProvider>,
    portfolio: SharedPortfolio,
    notifier: Notifier,
    monitors: MonitorRegistry,
    analyzer: PortfolioAnalyzer,
    optimizer: PortfolioOptimizer,
    engine: ScoringEngine,
    alpha: Option<AlphaVantageClient>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        portfolio: SharedPortfolio,
        notifier: Notifier,
        alpha: Option<AlphaVantageClient>,
    ) -> Self {
        Self {
            monitors: MonitorRegistry::new(provider.clone(), portfolio.clone(), notifier.clone()),
            analyzer: PortfolioAnalyzer::new(portfolio.clone(), provider.clone()),
            optimizer: PortfolioOptimizer::new(provider.clone()),
            engine: ScoringEngine::new(provider.clone()),
            provider,
            portfolio,
            notifier,
            alpha,
        }
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooProvider::from_settings(settings)?);
        let portfolio = PortfolioStore::open(settings.portfolio_file.clone())
            .await
            .into_shared();
        let notifier = Notifier::from_settings(settings);
        let alpha = match settings.alpha_vantage_api_key {
            Some(_) => Some(AlphaVantageClient::from_settings(settings)?),
            None => None,
        };
        Ok(Self::new(provider, portfolio, notifier, alpha))
    }

    pub fn provider(&self) -> &dyn MarketDataProvider {
        self.provider.as_ref()
    }

    /// Stops every running monitor; used on shutdown.
    pub async fn shutdown(&self) {
        let stopped = self.monitors.stop_all().await;
        if !stopped.is_empty() {
            tracing::info!(count = stopped.len(), "monitors stopped");
        }
    }

    /// Runs one tool. Failures become an `isError` result, never a protocol fault.
    pub async fn call(&self, params: CallToolParams) -> CallToolResult {
        let args = params.arguments.unwrap_or_else(|| json!({}));
        let outcome = self
            .dispatch(&params.name, args)
            .await
            .and_then(|v| serde_json::to_string_pretty(&v).context("failed to encode tool result"));

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(err) => {
                tracing::warn!(tool = %params.name, error = %format!("{err:#}"), "tool call failed");
                CallToolResult::error(&err)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<Value> {
        match name {
            "get_stock_price" => {
                let a: SymbolArgs = parse(name, args)?;
                let quote = self.provider.quote(&normalize_symbol(&a.symbol)?).await?;
                to_value(quote)
            }
            "get_multiple_stocks" => {
                let a: SymbolsArgs = parse(name, args)?;
                let symbols = a
                    .symbols
                    .iter()
                    .map(|s| normalize_symbol(s))
                    .collect::<Result<Vec<_>>>()?;
                let quotes = self
                    .provider
                    .quotes(&symbols)
                    .await
                    .context("Failed to fetch multiple stocks")?;
                to_value(quotes.iter().map(QuoteBrief::from).collect::<Vec<_>>())
            }
            "get_historical_data" => {
                let a: HistoryArgs = parse(name, args)?;
                let period = a
                    .period
                    .as_deref()
                    .map(HistoryPeriod::parse_lenient)
                    .unwrap_or_default();
                let series = self
                    .provider
                    .history(&normalize_symbol(&a.symbol)?, period)
                    .await?;
                to_value(series)
            }
            "get_technical_indicators" => {
                let a: SymbolArgs = parse(name, args)?;
                to_value(technical_indicators(self.provider(), &normalize_symbol(&a.symbol)?).await?)
            }
            "get_nasdaq100_overview" => to_value(market_overview(self.provider()).await?),
            "get_financial_info" => {
                let a: SymbolArgs = parse(name, args)?;
                to_value(self.provider.financials(&normalize_symbol(&a.symbol)?).await?)
            }
            "get_ai_score" => {
                let a: SymbolArgs = parse(name, args)?;
                to_value(self.engine.score(&normalize_symbol(&a.symbol)?).await?)
            }
            "get_external_indicators" => {
                let a: SymbolArgs = parse(name, args)?;
                let Some(alpha) = &self.alpha else {
                    bail!("ALPHA_VANTAGE_API_KEY is not configured");
                };
                to_value(alpha.indicators(&normalize_symbol(&a.symbol)?).await?)
            }

            "add_to_portfolio" => {
                let request: HoldingRequest = parse(name, args)?;
                let symbol = request.symbol.trim().to_ascii_uppercase();
                let holdings = self.portfolio.lock().await.add_stock(request).await?;
                Ok(json!({
                    "success": true,
                    "message": format!("Added {symbol} to portfolio"),
                    "portfolio": holdings,
                }))
            }
            "remove_from_portfolio" => {
                let a: SymbolArgs = parse(name, args)?;
                let symbol = normalize_symbol(&a.symbol)?;
                let holdings = self.portfolio.lock().await.remove_stock(&symbol).await?;
                Ok(json!({
                    "success": true,
                    "message": format!("Removed {symbol} from portfolio"),
                    "portfolio": holdings,
                }))
            }
            "get_portfolio" => {
                let mut store = self.portfolio.lock().await;
                to_value(store.load().await)
            }
            "get_portfolio_summary" => {
                let holdings = self.portfolio.lock().await.load().await.to_vec();
                to_value(summarize(&holdings, self.provider()).await)
            }
            "clear_portfolio" => {
                self.portfolio.lock().await.clear().await?;
                Ok(json!({"success": true, "message": "Portfolio cleared"}))
            }

            "generate_daily_report" => to_value(self.analyzer.generate_daily_report().await),
            "send_daily_report" => {
                let a: EmailArgs = parse(name, args)?;
                let report = self.analyzer.generate_daily_report().await;
                let sent = self.notifier.send_daily_report(a.email.as_deref(), &report).await;
                Ok(sent_result(sent, "Daily report"))
            }
            "send_price_alert" => {
                let a: SymbolEmailArgs = parse(name, args)?;
                let quote = self.provider.quote(&normalize_symbol(&a.symbol)?).await?;
                let sent = self.notifier.send_price_alert(a.email.as_deref(), &quote).await;
                Ok(sent_result(sent, &format!("Price alert for {}", quote.symbol)))
            }
            "send_market_overview" => {
                let a: EmailArgs = parse(name, args)?;
                let overview = market_overview(self.provider()).await?;
                let sent = self
                    .notifier
                    .send_market_overview(a.email.as_deref(), &overview)
                    .await;
                Ok(sent_result(sent, "Market overview"))
            }
            "recommend_portfolio" => {
                let a: RecommendArgs = parse(name, args)?;
                let tolerance = a
                    .risk_tolerance
                    .as_deref()
                    .map(RiskTolerance::parse_lenient)
                    .unwrap_or_default();
                let rec = self.optimizer.recommend_portfolio(a.budget, tolerance).await?;
                let mut out = to_value(&rec)?;
                if a.send_email {
                    let sent = self
                        .notifier
                        .send_portfolio_recommendation(a.email.as_deref(), &rec)
                        .await;
                    out["emailSent"] = Value::Bool(sent);
                }
                Ok(out)
            }

            "start_portfolio_monitoring" => {
                let a: PortfolioMonitorArgs = parse(name, args)?;
                let defaults = AlertThresholds::default();
                let opts = PortfolioMonitorOptions {
                    check_interval: minutes(a.check_interval_minutes)?,
                    thresholds: AlertThresholds {
                        price_move_pct: a.price_alert_threshold.unwrap_or(defaults.price_move_pct),
                        profit_pct: a.profit_alert_threshold.unwrap_or(defaults.profit_pct),
                        loss_pct: a.loss_alert_threshold.unwrap_or(defaults.loss_pct),
                    },
                    recipient: a.email,
                };
                to_value(self.monitors.start_portfolio_monitor(opts).await?)
            }
            "monitor_stock" => {
                let a: StockWatchArgs = parse(name, args)?;
                let opts = StockWatchOptions {
                    symbol: a.symbol,
                    check_interval: minutes(a.check_interval_minutes)?,
                    price_alert_pct: a
                        .price_alert_threshold
                        .unwrap_or(StockWatchOptions::default().price_alert_pct),
                    recipient: a.email,
                };
                to_value(self.monitors.start_stock_watch(opts).await?)
            }
            "schedule_daily_report" => {
                let a: ScheduleArgs = parse(name, args)?;
                let at = match a.time.as_deref() {
                    Some(raw) => raw.parse::<DailyTime>()?,
                    None => DailyTime::default(),
                };
                let opts = DailyReportOptions {
                    at,
                    content: a.content.unwrap_or_default(),
                    skip_weekends: a.skip_weekends,
                    recipient: a.email,
                };
                to_value(self.monitors.start_daily_report(opts).await?)
            }
            "stop_monitor" => {
                let a: StopArgs = parse(name, args)?;
                let id: MonitorHandle = a.id.parse()?;
                let info = self.monitors.stop(id).await?;
                Ok(json!({"success": true, "stopped": info}))
            }
            "list_monitors" => to_value(self.monitors.list().await),
            "get_stock_alerts" => {
                let a: StockAlertArgs = parse(name, args)?;
                let symbol = normalize_symbol(&a.symbol)?;
                let alerts = stock_alerts(self.provider(), &symbol, a.breakout_price).await?;
                Ok(json!({"symbol": symbol, "alerts": alerts}))
            }

            other => bail!("Unknown tool: {other}"),
        }
    }
}

fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).with_context(|| format!("invalid arguments for {tool}"))
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value> {
    serde_json::to_value(v).context("failed to encode tool result")
}

fn minutes(raw: Option<f64>) -> Result<Duration> {
    let Some(m) = raw else {
        return Ok(PortfolioMonitorOptions::default().check_interval);
    };
    if !m.is_finite() || m <= 0.0 {
        bail!("checkIntervalMinutes must be positive (got {m})");
    }
    Ok(Duration::from_secs_f64(m * 60.0))
}

fn sent_result(sent: bool, what: &str) -> Value {
    let message = if sent {
        format!("{what} sent")
    } else {
        format!("{what} was not sent; check email configuration and logs")
    };
    json!({"success": sent, "message": message})
}

#[derive(Debug, Deserialize)]
struct SymbolArgs {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct SymbolsArgs {
    symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    symbol: String,
    #[serde(default)]
    period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailArgs {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolEmailArgs {
    symbol: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendArgs {
    budget: f64,
    #[serde(default)]
    risk_tolerance: Option<String>,
    #[serde(default)]
    send_email: bool,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioMonitorArgs {
    #[serde(default)]
    check_interval_minutes: Option<f64>,
    #[serde(default)]
    price_alert_threshold: Option<f64>,
    #[serde(default)]
    profit_alert_threshold: Option<f64>,
    #[serde(default)]
    loss_alert_threshold: Option<f64>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockWatchArgs {
    symbol: String,
    #[serde(default)]
    check_interval_minutes: Option<f64>,
    #[serde(default)]
    price_alert_threshold: Option<f64>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    content: Option<ReportContent>,
    #[serde(default)]
    skip_weekends: bool,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockAlertArgs {
    symbol: String,
    #[serde(default)]
    breakout_price: Option<f64>,
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn symbol_only() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {"type": "string", "description": "Stock symbol (e.g., AAPL, MSFT, NVDA)"}
        },
        "required": ["symbol"]
    })
}

fn email_only() -> Value {
    json!({
        "type": "object",
        "properties": {
            "email": {"type": "string", "description": "Recipient; defaults to NOTIFICATION_EMAIL"}
        }
    })
}

fn no_args() -> Value {
    json!({"type": "object", "properties": {}})
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_stock_price",
            "Get current stock price and basic info for a NASDAQ-100 symbol",
            symbol_only(),
        ),
        tool(
            "get_multiple_stocks",
            "Get prices for multiple stocks at once",
            json!({
                "type": "object",
                "properties": {
                    "symbols": {"type": "array", "items": {"type": "string"}, "description": "Array of stock symbols"}
                },
                "required": ["symbols"]
            }),
        ),
        tool(
            "get_historical_data",
            "Get historical price data for a stock",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "period": {
                        "type": "string",
                        "enum": ["1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y"],
                        "description": "Time period for historical data"
                    }
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "get_technical_indicators",
            "Get technical indicators (MA, RSI) for a stock",
            symbol_only(),
        ),
        tool(
            "get_nasdaq100_overview",
            "Get NASDAQ-100 market overview with top gainers and losers",
            no_args(),
        ),
        tool(
            "get_financial_info",
            "Get financial metrics and valuation for a stock",
            symbol_only(),
        ),
        tool(
            "get_ai_score",
            "Composite 0-100 score from technical, fundamental, sentiment, momentum and risk factors",
            symbol_only(),
        ),
        tool(
            "get_external_indicators",
            "Latest daily RSI and MACD from Alpha Vantage (requires ALPHA_VANTAGE_API_KEY)",
            symbol_only(),
        ),
        tool(
            "add_to_portfolio",
            "Add shares to the portfolio; repeat purchases average the cost basis",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "shares": {"type": "number", "description": "Number of shares"},
                    "purchasePrice": {"type": "number", "description": "Price paid per share"}
                },
                "required": ["symbol", "shares", "purchasePrice"]
            }),
        ),
        tool(
            "remove_from_portfolio",
            "Remove a symbol from the portfolio",
            symbol_only(),
        ),
        tool("get_portfolio", "List stored holdings", no_args()),
        tool(
            "get_portfolio_summary",
            "Holdings valued at current prices with profit/loss totals",
            no_args(),
        ),
        tool("clear_portfolio", "Remove every holding", no_args()),
        tool(
            "generate_daily_report",
            "Full portfolio analysis with recommendations, rebalancing and top picks",
            no_args(),
        ),
        tool(
            "send_daily_report",
            "Generate the daily portfolio report and email it",
            email_only(),
        ),
        tool(
            "send_price_alert",
            "Email the current quote for a symbol",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "email": {"type": "string"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "send_market_overview",
            "Email the NASDAQ-100 market overview",
            email_only(),
        ),
        tool(
            "recommend_portfolio",
            "Build a sector-balanced portfolio for a budget and risk tolerance",
            json!({
                "type": "object",
                "properties": {
                    "budget": {"type": "number", "description": "Amount to invest in USD"},
                    "riskTolerance": {"type": "string", "enum": ["conservative", "moderate", "aggressive"]},
                    "sendEmail": {"type": "boolean", "description": "Also email the recommendation"},
                    "email": {"type": "string"}
                },
                "required": ["budget"]
            }),
        ),
        tool(
            "start_portfolio_monitoring",
            "Periodically check holdings and email price, profit and loss alerts",
            json!({
                "type": "object",
                "properties": {
                    "checkIntervalMinutes": {"type": "number", "default": 5},
                    "priceAlertThreshold": {"type": "number", "default": 5},
                    "profitAlertThreshold": {"type": "number", "default": 10},
                    "lossAlertThreshold": {"type": "number", "default": -5},
                    "email": {"type": "string"}
                }
            }),
        ),
        tool(
            "monitor_stock",
            "Watch one symbol and email technical signals and large price moves",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "checkIntervalMinutes": {"type": "number", "default": 5},
                    "priceAlertThreshold": {"type": "number", "default": 5},
                    "email": {"type": "string"}
                },
                "required": ["symbol"]
            }),
        ),
        tool(
            "schedule_daily_report",
            "Email a market overview or portfolio report every day at a fixed local time",
            json!({
                "type": "object",
                "properties": {
                    "time": {"type": "string", "description": "HH:MM, local time", "default": "09:00"},
                    "content": {"type": "string", "enum": ["market_overview", "portfolio_report"]},
                    "skipWeekends": {"type": "boolean", "description": "Skip weekends and market holidays"},
                    "email": {"type": "string"}
                }
            }),
        ),
        tool(
            "stop_monitor",
            "Stop a running monitor by id",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"]
            }),
        ),
        tool("list_monitors", "List running monitors", no_args()),
        tool(
            "get_stock_alerts",
            "Check a symbol for AI signal, breakout and volume spike alerts without sending anything",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "breakoutPrice": {"type": "number", "description": "Resistance level for breakout alerts"}
                },
                "required": ["symbol"]
            }),
        ),
    ]
}

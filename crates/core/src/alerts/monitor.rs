use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use uuid::Uuid;

use crate::alerts::triggers::{holding_alerts, AlertThresholds, PriceBaselines};
use crate::domain::contract::normalize_symbol;
use crate::indicators::technical_indicators;
use crate::market::nasdaq::market_overview;
use crate::market::MarketDataProvider;
use crate::notify::Notifier;
use crate::portfolio::analyzer::PortfolioAnalyzer;
use crate::portfolio::store::SharedPortfolio;
use crate::portfolio::summary::summarize;
use crate::time::schedule::{configured_holidays, DailySchedule, DailyTime};

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const SCHEDULE_POLL: Duration = Duration::from_secs(60);
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Opaque id for a running monitor, printable and parseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorHandle(Uuid);

impl MonitorHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MonitorHandle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = Uuid::parse_str(s.trim()).with_context(|| format!("invalid monitor id: {s}"))?;
        Ok(Self(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    Portfolio,
    StockWatch,
    DailyReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInfo {
    pub id: MonitorHandle,
    pub kind: MonitorKind,
    pub description: String,
    pub recipient: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioMonitorOptions {
    pub check_interval: Duration,
    pub thresholds: AlertThresholds,
    pub recipient: Option<String>,
}

impl Default for PortfolioMonitorOptions {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            thresholds: AlertThresholds::default(),
            recipient: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockWatchOptions {
    pub symbol: String,
    pub check_interval: Duration,
    pub price_alert_pct: f64,
    pub recipient: Option<String>,
}

impl Default for StockWatchOptions {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            price_alert_pct: AlertThresholds::default().price_move_pct,
            recipient: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportContent {
    #[default]
    MarketOverview,
    PortfolioReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReportOptions {
    pub at: DailyTime,
    pub content: ReportContent,
    pub skip_weekends: bool,
    pub recipient: Option<String>,
}

impl Default for DailyReportOptions {
    fn default() -> Self {
        Self {
            at: DailyTime::default(),
            content: ReportContent::default(),
            skip_weekends: false,
            recipient: None,
        }
    }
}

struct RunningMonitor {
    info: MonitorInfo,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns every background monitor in the process.
///
/// Each monitor is one task that ticks until its cancellation flag flips.
/// A tick always runs to completion; `stop` waits for it before returning.
pub struct MonitorRegistry {
    provider: Arc<dyn MarketDataProvider>,
    portfolio: SharedPortfolio,
    notifier: Notifier,
    analyzer: PortfolioAnalyzer,
    monitors: tokio::sync::Mutex<HashMap<MonitorHandle, RunningMonitor>>,
}

impl MonitorRegistry {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        portfolio: SharedPortfolio,
        notifier: Notifier,
    ) -> Self {
        Self {
            analyzer: PortfolioAnalyzer::new(portfolio.clone(), provider.clone()),
            provider,
            portfolio,
            notifier,
            monitors: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Watches every holding for price moves and profit/loss thresholds.
    /// Refuses to start while the portfolio is empty.
    pub async fn start_portfolio_monitor(&self, opts: PortfolioMonitorOptions) -> Result<MonitorInfo> {
        ensure_interval(opts.check_interval)?;
        let symbols: Vec<String> = {
            let mut store = self.portfolio.lock().await;
            store.load().await.iter().map(|h| h.symbol.clone()).collect()
        };
        if symbols.is_empty() {
            bail!("Portfolio is empty. Add stocks first!");
        }

        let ctx = PortfolioCheck {
            provider: self.provider.clone(),
            portfolio: self.portfolio.clone(),
            notifier: self.notifier.clone(),
            thresholds: opts.thresholds,
            recipient: self.notifier.resolve_recipient(opts.recipient.as_deref()),
        };
        let description = format!(
            "Monitoring {} stocks every {}s: {}",
            symbols.len(),
            opts.check_interval.as_secs(),
            symbols.join(", ")
        );
        let recipient = ctx.recipient.clone();
        let interval = opts.check_interval;

        self.spawn(MonitorKind::Portfolio, description, recipient, move |cancel| {
            run_every(interval, cancel, ctx)
        })
        .await
    }

    /// Technical and price-move alerts for a single symbol.
    pub async fn start_stock_watch(&self, opts: StockWatchOptions) -> Result<MonitorInfo> {
        ensure_interval(opts.check_interval)?;
        let symbol = normalize_symbol(&opts.symbol)?;

        let ctx = StockCheck {
            provider: self.provider.clone(),
            notifier: self.notifier.clone(),
            symbol: symbol.clone(),
            price_alert_pct: opts.price_alert_pct,
            recipient: self.notifier.resolve_recipient(opts.recipient.as_deref()),
        };
        let description = format!(
            "Watching {symbol} every {}s (price alert at {}%)",
            opts.check_interval.as_secs(),
            opts.price_alert_pct
        );
        let recipient = ctx.recipient.clone();
        let interval = opts.check_interval;

        self.spawn(MonitorKind::StockWatch, description, recipient, move |cancel| {
            run_every(interval, cancel, ctx)
        })
        .await
    }

    /// Mails a market overview or the full portfolio report once a day.
    pub async fn start_daily_report(&self, opts: DailyReportOptions) -> Result<MonitorInfo> {
        let ctx = DailyCheck {
            provider: self.provider.clone(),
            analyzer: self.analyzer.clone(),
            notifier: self.notifier.clone(),
            content: opts.content,
            recipient: self.notifier.resolve_recipient(opts.recipient.as_deref()),
        };
        let schedule = DailySchedule::new(opts.at, opts.skip_weekends)
            .with_holidays(configured_holidays());
        let description = format!(
            "Daily {:?} at {}{}",
            opts.content,
            opts.at,
            if opts.skip_weekends { " on trading days" } else { "" }
        );
        let recipient = ctx.recipient.clone();

        self.spawn(MonitorKind::DailyReport, description, recipient, move |cancel| {
            run_daily(ctx, schedule, cancel)
        })
        .await
    }

    async fn spawn<F, Fut>(
        &self,
        kind: MonitorKind,
        description: String,
        recipient: Option<String>,
        body: F,
    ) -> Result<MonitorInfo>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = MonitorHandle::new();
        let (cancel, cancel_rx) = watch::channel(false);
        let span = tracing::info_span!("monitor", %id, kind = ?kind);
        let task = tokio::spawn(body(cancel_rx).instrument(span));

        let info = MonitorInfo {
            id,
            kind,
            description,
            recipient,
            started_at: Utc::now(),
        };
        tracing::info!(%id, kind = ?kind, description = %info.description, "monitor started");

        self.monitors.lock().await.insert(
            id,
            RunningMonitor {
                info: info.clone(),
                cancel,
                task,
            },
        );
        Ok(info)
    }

    /// Signals the monitor and waits for its current tick to finish.
    pub async fn stop(&self, id: MonitorHandle) -> Result<MonitorInfo> {
        let running = self.monitors.lock().await.remove(&id);
        let Some(running) = running else {
            bail!("No monitor with id {id}");
        };
        Ok(shutdown(running).await)
    }

    pub async fn stop_all(&self) -> Vec<MonitorInfo> {
        let drained: Vec<RunningMonitor> = self.monitors.lock().await.drain().map(|(_, m)| m).collect();
        let mut stopped = Vec::with_capacity(drained.len());
        for running in drained {
            stopped.push(shutdown(running).await);
        }
        stopped
    }

    pub async fn list(&self) -> Vec<MonitorInfo> {
        let mut out: Vec<MonitorInfo> = self
            .monitors
            .lock()
            .await
            .values()
            .map(|m| m.info.clone())
            .collect();
        out.sort_by_key(|m| m.started_at);
        out
    }
}

fn ensure_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        bail!("check interval must be positive");
    }
    Ok(())
}

async fn shutdown(running: RunningMonitor) -> MonitorInfo {
    let RunningMonitor {
        info,
        cancel,
        mut task,
    } = running;
    let _ = cancel.send(true);

    match tokio::time::timeout(STOP_GRACE, &mut task).await {
        Ok(Ok(())) => tracing::info!(id = %info.id, "monitor stopped"),
        Ok(Err(err)) => tracing::error!(id = %info.id, error = %err, "monitor task ended abnormally"),
        Err(_) => {
            tracing::warn!(id = %info.id, "monitor did not stop in time; aborting");
            task.abort();
        }
    }
    info
}

/// One pass of a fixed-rate monitor.
#[async_trait::async_trait]
trait IntervalCheck: Send + Sync + 'static {
    async fn tick(&self, baselines: &mut PriceBaselines);
}

/// Ticks immediately, then every `interval` until cancelled.
async fn run_every<C: IntervalCheck>(interval: Duration, mut cancel: watch::Receiver<bool>, ctx: C) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut baselines = PriceBaselines::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => ctx.tick(&mut baselines).await,
            _ = cancel.changed() => break,
        }
        if *cancel.borrow() {
            break;
        }
    }
}

async fn run_daily(ctx: DailyCheck, mut schedule: DailySchedule, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(SCHEDULE_POLL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(at = %schedule.at(), "daily schedule armed");

    loop {
        tokio::select! {
            _ = ticker.tick() => ctx.tick(&mut schedule, Local::now().naive_local()).await,
            _ = cancel.changed() => break,
        }
        if *cancel.borrow() {
            break;
        }
    }
}

struct PortfolioCheck {
    provider: Arc<dyn MarketDataProvider>,
    portfolio: SharedPortfolio,
    notifier: Notifier,
    thresholds: AlertThresholds,
    recipient: Option<String>,
}

#[async_trait::async_trait]
impl IntervalCheck for PortfolioCheck {
    async fn tick(&self, baselines: &mut PriceBaselines) {
        let holdings = {
            let mut store = self.portfolio.lock().await;
            store.load().await.to_vec()
        };
        let summary = summarize(&holdings, self.provider.as_ref()).await;

        for row in &summary.holdings {
            tracing::info!(
                symbol = %row.symbol,
                price = row.current_price,
                day_pct = row.change_today.unwrap_or(0.0),
                total_pct = row.profit_percent,
                "holding checked"
            );
            for alert in holding_alerts(row, &self.thresholds, baselines) {
                tracing::info!(symbol = %row.symbol, kind = ?alert.kind, percent = alert.percent, "holding alert");
                self.notifier
                    .send_holding_alert(self.recipient.as_deref(), row, &alert)
                    .await;
            }
        }

        tracing::info!(
            total_value = summary.totals.total_current_value,
            total_pct = summary.totals.total_profit_percent,
            "portfolio total"
        );
    }
}

struct StockCheck {
    provider: Arc<dyn MarketDataProvider>,
    notifier: Notifier,
    symbol: String,
    price_alert_pct: f64,
    recipient: Option<String>,
}

#[async_trait::async_trait]
impl IntervalCheck for StockCheck {
    async fn tick(&self, baselines: &mut PriceBaselines) {
        let recipient = self.recipient.as_deref();

        match technical_indicators(self.provider.as_ref(), &self.symbol).await {
            Ok(ind) if ind.signal.action.is_strong() => {
                tracing::info!(symbol = %self.symbol, action = %ind.signal.action, "strong signal");
                self.notifier.send_technical_alert(recipient, &ind).await;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(symbol = %self.symbol, error = %format!("{err:#}"), "indicator check failed");
            }
        }

        match self.provider.quote(&self.symbol).await {
            Ok(quote) => {
                if let Some(moved) =
                    baselines.check(&quote.symbol, quote.price, quote.previous_close, self.price_alert_pct)
                {
                    tracing::info!(symbol = %quote.symbol, moved, "price move");
                    self.notifier.send_price_alert(recipient, &quote).await;
                }
            }
            Err(err) => {
                tracing::warn!(symbol = %self.symbol, error = %format!("{err:#}"), "quote check failed");
            }
        }
    }
}

struct DailyCheck {
    provider: Arc<dyn MarketDataProvider>,
    analyzer: PortfolioAnalyzer,
    notifier: Notifier,
    content: ReportContent,
    recipient: Option<String>,
}

impl DailyCheck {
    async fn tick(&self, schedule: &mut DailySchedule, now: NaiveDateTime) {
        if !schedule.due(now) {
            return;
        }
        tracing::info!(content = ?self.content, "sending scheduled report");
        let recipient = self.recipient.as_deref();

        match self.content {
            ReportContent::MarketOverview => match market_overview(self.provider.as_ref()).await {
                Ok(overview) => {
                    self.notifier.send_market_overview(recipient, &overview).await;
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "scheduled market overview failed");
                }
            },
            ReportContent::PortfolioReport => {
                let report = self.analyzer.generate_daily_report().await;
                self.notifier.send_daily_report(recipient, &report).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::HoldingRequest;
    use crate::portfolio::store::PortfolioStore;
    use crate::test_support::{quote, FakeProvider, RecordingMailer};
    use chrono::NaiveDate;

    async fn registry(
        dir: &tempfile::TempDir,
        provider: Arc<FakeProvider>,
        mailer: Arc<RecordingMailer>,
    ) -> MonitorRegistry {
        let store = PortfolioStore::open(dir.path().join("p.json")).await.into_shared();
        MonitorRegistry::new(
            provider,
            store,
            Notifier::new(mailer, Some("me@example.com".to_string())),
        )
    }

    #[test]
    fn handle_round_trips_through_text() {
        let h = MonitorHandle::new();
        assert_eq!(h.to_string().parse::<MonitorHandle>().unwrap(), h);
        assert!("not-a-uuid".parse::<MonitorHandle>().is_err());
    }

    #[test]
    fn option_defaults() {
        let p = PortfolioMonitorOptions::default();
        assert_eq!(p.check_interval, Duration::from_secs(300));
        assert_eq!(p.thresholds.loss_pct, -5.0);
        let d = DailyReportOptions::default();
        assert_eq!(d.at.to_string(), "09:00");
        assert_eq!(d.content, ReportContent::MarketOverview);
        assert!(!d.skip_weekends);
    }

    #[tokio::test]
    async fn refuses_empty_portfolio() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, Arc::default(), Arc::default()).await;
        let err = reg
            .start_portfolio_monitor(PortfolioMonitorOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Portfolio is empty"));
        assert!(reg.list().await.is_empty());
    }

    #[tokio::test]
    async fn portfolio_monitor_alerts_on_first_tick_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.set_quote(quote("NVDA", 130.0, Some(1.0)));
        let mailer = Arc::new(RecordingMailer::default());
        let reg = registry(&dir, provider, mailer.clone()).await;
        reg.portfolio
            .lock()
            .await
            .add_stock(HoldingRequest {
                symbol: "NVDA".to_string(),
                shares: 1.0,
                purchase_price: 100.0,
            })
            .await
            .unwrap();

        let info = reg
            .start_portfolio_monitor(PortfolioMonitorOptions::default())
            .await
            .unwrap();
        assert_eq!(info.kind, MonitorKind::Portfolio);
        assert_eq!(info.recipient.as_deref(), Some("me@example.com"));
        assert_eq!(reg.list().await.len(), 1);

        // the first tick fires immediately
        for _ in 0..50 {
            if !mailer.subjects().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(mailer.subjects(), vec!["💰 NVDA reached 30.00% profit!".to_string()]);

        let stopped = reg.stop(info.id).await.unwrap();
        assert_eq!(stopped.id, info.id);
        assert!(reg.list().await.is_empty());
        assert!(reg.stop(info.id).await.is_err());
    }

    #[tokio::test]
    async fn stock_watch_sends_price_alert_on_move() {
        let provider = Arc::new(FakeProvider::default());
        let mut q = quote("TSLA", 110.0, Some(10.0));
        q.previous_close = Some(100.0);
        provider.set_quote(q);
        let mailer = Arc::new(RecordingMailer::default());

        let check = StockCheck {
            provider: provider.clone(),
            notifier: Notifier::new(mailer.clone(), Some("me@example.com".to_string())),
            symbol: "TSLA".to_string(),
            price_alert_pct: 5.0,
            recipient: Some("me@example.com".to_string()),
        };
        let mut baselines = PriceBaselines::default();
        check.tick(&mut baselines).await;
        check.tick(&mut baselines).await;

        // no history, so only the price trigger can fire, and only once
        assert_eq!(mailer.subjects(), vec!["📊 TSLA Stock Alert - $110.00".to_string()]);
    }

    #[tokio::test]
    async fn daily_check_fires_once_in_its_minute() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        provider.set_quote(quote("AAPL", 200.0, Some(2.0)));
        let mailer = Arc::new(RecordingMailer::default());
        let store = PortfolioStore::open(dir.path().join("p.json")).await.into_shared();

        let check = DailyCheck {
            provider: provider.clone(),
            analyzer: PortfolioAnalyzer::new(store, provider),
            notifier: Notifier::new(mailer.clone(), Some("me@example.com".to_string())),
            content: ReportContent::MarketOverview,
            recipient: None,
        };
        let mut schedule = DailySchedule::new(DailyTime::default(), false);
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        check.tick(&mut schedule, day.and_hms_opt(8, 59, 0).unwrap()).await;
        check.tick(&mut schedule, day.and_hms_opt(9, 0, 0).unwrap()).await;
        check.tick(&mut schedule, day.and_hms_opt(9, 0, 40).unwrap()).await;

        assert_eq!(
            mailer.subjects(),
            vec!["📈 NASDAQ-100 Market Overview - Bullish".to_string()]
        );
    }

    #[tokio::test]
    async fn stop_all_drains_registry() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir, Arc::default(), Arc::default()).await;
        for symbol in ["AAPL", "MSFT"] {
            reg.start_stock_watch(StockWatchOptions {
                symbol: symbol.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        reg.start_daily_report(DailyReportOptions::default())
            .await
            .unwrap();

        assert_eq!(reg.list().await.len(), 3);
        assert_eq!(reg.stop_all().await.len(), 3);
        assert!(reg.list().await.is_empty());
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockpilot_core::alerts::{
    DailyReportOptions, MonitorRegistry, PortfolioMonitorOptions, ReportContent,
};
use stockpilot_core::config::Settings;
use stockpilot_core::market::yahoo::YahooProvider;
use stockpilot_core::market::MarketDataProvider;
use stockpilot_core::notify::Notifier;
use stockpilot_core::portfolio::{PortfolioAnalyzer, PortfolioStore};
use stockpilot_core::time::DailyTime;

#[derive(Debug, Parser)]
#[command(name = "stockpilot_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the daily portfolio report once.
    Report {
        /// Email the report instead of only printing it.
        #[arg(long)]
        email: bool,

        /// Recipient; defaults to NOTIFICATION_EMAIL.
        #[arg(long)]
        to: Option<String>,

        /// Skip printing the JSON report.
        #[arg(long)]
        quiet: bool,
    },

    /// Run portfolio alerts and/or a scheduled daily email until Ctrl-C.
    Monitor {
        /// Minutes between portfolio checks. Omit to disable portfolio alerts.
        #[arg(long)]
        interval_minutes: Option<u64>,

        /// Daily email time (HH:MM, local). Omit to disable the schedule.
        #[arg(long)]
        daily_at: Option<DailyTime>,

        /// Send the full portfolio report instead of the market overview.
        #[arg(long)]
        portfolio_report: bool,

        /// Skip weekends and market holidays for the daily email.
        #[arg(long)]
        trading_days_only: bool,

        /// Recipient; defaults to NOTIFICATION_EMAIL.
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(&settings, args.command).await;
    if let Err(e) = &result {
        sentry_anyhow::capture_anyhow(e);
        tracing::error!(error = %format!("{e:#}"), "worker failed");
    }
    result
}

async fn run(settings: &Settings, command: Command) -> anyhow::Result<()> {
    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooProvider::from_settings(settings)?);
    let portfolio = PortfolioStore::open(settings.portfolio_file.clone())
        .await
        .into_shared();
    let notifier = Notifier::from_settings(settings);

    match command {
        Command::Report { email, to, quiet } => {
            let analyzer = PortfolioAnalyzer::new(portfolio, provider);
            let report = analyzer.generate_daily_report().await;

            if !quiet {
                let json = serde_json::to_string_pretty(&report).context("encode report")?;
                println!("{json}");
            }
            if email {
                let sent = notifier.send_daily_report(to.as_deref(), &report).await;
                anyhow::ensure!(sent, "daily report email was not sent");
                tracing::info!(date = %report.date, "daily report emailed");
            }
            Ok(())
        }

        Command::Monitor {
            interval_minutes,
            daily_at,
            portfolio_report,
            trading_days_only,
            to,
        } => {
            anyhow::ensure!(
                interval_minutes.is_some() || daily_at.is_some(),
                "nothing to run: pass --interval-minutes and/or --daily-at"
            );
            let registry = MonitorRegistry::new(provider, portfolio, notifier);

            if let Some(minutes) = interval_minutes {
                let opts = PortfolioMonitorOptions {
                    check_interval: interval_from_minutes(minutes)?,
                    recipient: to.clone(),
                    ..Default::default()
                };
                let info = registry.start_portfolio_monitor(opts).await?;
                tracing::info!(id = %info.id, "{}", info.description);
            }
            if let Some(at) = daily_at {
                let opts = DailyReportOptions {
                    at,
                    content: if portfolio_report {
                        ReportContent::PortfolioReport
                    } else {
                        ReportContent::MarketOverview
                    },
                    skip_weekends: trading_days_only,
                    recipient: to,
                };
                let info = registry.start_daily_report(opts).await?;
                tracing::info!(id = %info.id, "{}", info.description);
            }

            let _ = tokio::signal::ctrl_c().await;
            let stopped = registry.stop_all().await;
            tracing::info!(count = stopped.len(), "monitors stopped");
            Ok(())
        }
    }
}

fn interval_from_minutes(minutes: u64) -> anyhow::Result<Duration> {
    anyhow::ensure!(minutes > 0, "--interval-minutes must be at least 1");
    let secs = minutes
        .checked_mul(60)
        .with_context(|| format!("--interval-minutes is too large: {minutes}"))?;
    Ok(Duration::from_secs(secs))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

mod protocol;
mod server;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockpilot_core::config::Settings;

use crate::tools::AppState;

#[derive(Debug, Parser)]
#[command(name = "stockpilot-mcp")]
struct Args {
    /// Serve MCP over HTTP (`POST /mcp`) instead of stdio.
    #[arg(long)]
    http: bool,

    /// HTTP port; falls back to PORT, then 3000.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // stdout carries the protocol in stdio mode.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let state = match AppState::from_settings(&settings).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            return Err(e);
        }
    };

    let result = if args.http {
        serve_http(state.clone(), args.port).await
    } else {
        tracing::info!("NASDAQ-100 stock MCP server running on stdio");
        tokio::select! {
            r = server::serve_stdio(state.clone()) => r,
            _ = shutdown_signal() => Ok(()),
        }
    };

    state.shutdown().await;

    if let Err(e) = &result {
        sentry_anyhow::capture_anyhow(e);
        tracing::error!(error = %format!("{e:#}"), "server exited with error");
    }
    result
}

async fn serve_http(state: Arc<AppState>, port: Option<u16>) -> anyhow::Result<()> {
    let port: u16 = port
        .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "mcp http listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

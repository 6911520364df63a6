//! Equity research orchestration engine: HTTP entrypoint. Builds
//! `AppState` once, wires the axum router, starts the prewarmer, and
//! serves with graceful shutdown on SIGINT/SIGTERM.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use equity_research_orchestrator::api;
use equity_research_orchestrator::config::Config;
use equity_research_orchestrator::prewarm;
use equity_research_orchestrator::state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Startup flags layered on top of `Config::from_env` (spec.md §6 env
/// vars remain authoritative; these are operator conveniences).
#[derive(Debug, Parser)]
#[command(name = "equity-research-orchestrator")]
struct Cli {
    /// Override PORT for this run without touching the environment.
    #[arg(long, env = "CLI_PORT")]
    port: Option<u16>,

    /// Load configuration, print it, and exit without binding a listener.
    #[arg(long)]
    config_check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    info!("equity research orchestration engine starting");

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    if cli.config_check {
        info!(?config, "configuration is valid");
        return Ok(());
    }

    let port = config.port;
    let state = AppState::build(config).context("failed to initialize application state")?;

    prewarm::spawn(state.clone());

    let app = api::build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "equity_research_orchestrator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

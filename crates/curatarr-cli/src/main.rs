// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use axum::serve;
use curatarr_api::router;
use curatarr_application::AppState;
use curatarr_config::{load as load_config, AppConfig, HttpConfig, TelemetryConfig};
use curatarr_domain::default_quality_definitions;
use curatarr_infrastructure::init_database;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// What the binary was asked to do.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Import the configured rule catalogs once and exit.
    Sync,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    config_path: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut command = Command::Serve;
    let mut config_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "serve" => command = Command::Serve,
            "sync" => command = Command::Sync,
            "--config" | "-c" => {
                let path = args.next().context("--config needs a file path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => bail!("unrecognised argument '{other}' (usage: curatarr [serve|sync] [--config FILE])"),
        }
    }

    Ok(Args {
        command,
        config_path,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = load_config(args.config_path.as_deref())?;
    init_tracing(&config.telemetry);

    let state = build_state(config).await?;
    state.on_start();

    match args.command {
        Command::Serve => run_server(state).await,
        Command::Sync => run_sync(state).await,
    }
}

async fn build_state(config: AppConfig) -> Result<AppState> {
    let pool = init_database(&config).await?;
    let state = AppState::with_rule_catalog(config, pool)?;

    let seeded = state
        .quality_definitions
        .seed_defaults(&default_quality_definitions())
        .await?;
    info!(target: "cli", seeded, "quality definitions ready");
    Ok(state)
}

async fn run_server(state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind_addr(&state.config.http)?).await?;
    let addr = listener.local_addr()?;
    info!(target: "cli", "listening on {}", addr);

    serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_sync(state: AppState) -> Result<()> {
    let media_types = state.catalog_media_types();
    info!(target: "cli", ?media_types, "syncing rule catalogs");

    let summary = state.importer.sync(&media_types).await;
    for error in &summary.errors {
        warn!(
            target: "cli",
            media_type = %error.media_type,
            record = error.record.as_deref().unwrap_or("<batch>"),
            message = %error.message,
            "import error"
        );
    }
    info!(
        target: "cli",
        imported = summary.imported_count,
        errors = summary.errors.len(),
        "sync finished"
    );
    Ok(())
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let fmt_layer = fmt::layer().with_target(true).with_thread_names(true).with_level(true);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn bind_addr(http: &HttpConfig) -> Result<SocketAddr> {
    let addr = format!("{}:{}", http.host, http.port);
    addr.parse()
        .with_context(|| format!("invalid listen address {addr}"))
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(target: "cli", %error, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                warn!(target: "cli", %error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }

    info!(target: "cli", "shutdown signal received");
}

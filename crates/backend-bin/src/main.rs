// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the boardsync server.

use anyhow::Context;
use backend_lib::{
    app,
    config::{LogFormat, Settings, DEFAULT_CONFIG_FILE},
    open_storage,
    seed::seed_defaults,
    AppState,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Whiteboard relay and persistence server
#[derive(Debug, Parser)]
#[command(name = "boardsync", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Listen address, overrides the configured one
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_ascii_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    init_tracing(&settings);

    let storage = open_storage(&settings).await?;

    match seed_defaults(&storage, &settings.seed).await {
        Ok(Some(report)) => {
            tracing::info!(teacher_id = %report.teacher_id, permalink = %report.permalink, "seed ready");
            // The panel link embeds the teacher token, so it goes to the console only
            println!("[seed] teacher panel: {}", report.teacher_panel_url);
            println!("[seed] test student: {}", report.student_url);
        },
        Ok(None) => {},
        Err(e) => tracing::error!(error = %e, "seeding failed"),
    }

    let addr = settings.bind_addr;
    let state = AppState::new(storage, settings);
    let router = app(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

//! HoniPlug Server
//!
//! Plugin host with a streaming API for plugin output.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use honiplug::admin::AdminService;
use honiplug::auth::CredentialStore;
use honiplug::config::Config;
use honiplug::server::{AppState, create_router};
use honiplug_js::JsEvaluator;
use honiplug_runtime::{CapabilityInjector, EventBus, PluginLoader, PluginSupervisor};

/// HoniPlug plugin host
#[derive(Parser, Debug)]
#[command(name = "honiplug")]
#[command(about = "HoniPlug plugin host server", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./honiplug.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plugin directory
    #[arg(long)]
    plugins_dir: Option<PathBuf>,

    /// Server host address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("honiplug=info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = args.plugins_dir {
        config.plugins.dir = Some(dir);
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.print_config {
        println!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    info!("Starting HoniPlug server v{}", env!("CARGO_PKG_VERSION"));

    // Plugin runtime
    let bus = EventBus::shared();
    let loader = PluginLoader::new(
        config.plugins.loader_config(),
        Arc::new(JsEvaluator::new(config.js.clone())),
    );
    let supervisor = Arc::new(PluginSupervisor::new(loader, CapabilityInjector::new(bus.clone())));
    supervisor.start().await?;

    for status in supervisor.statuses() {
        match &status.error {
            None => info!("  - {} ({})", status.name, status.state),
            Some(e) => warn!(
                "  - {} ({} while {}): {}",
                status.name,
                status.state,
                status.failed_in.map(|s| s.to_string()).unwrap_or_default(),
                e
            ),
        }
    }

    let credentials = CredentialStore::from_config(&config.auth);
    if credentials.is_empty() {
        warn!("No access tokens configured; authenticated endpoints will refuse every request");
    }

    let state = AppState::new(
        bus.clone(),
        supervisor,
        credentials,
        AdminService::new(&config.admin),
    );
    let dispatcher = state.dispatcher().clone();
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!("Streaming endpoint: ws://{}/streaming", addr);

    // Plugins may start pushing output once clients can connect
    if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.notify_websocket_ready()).await {
        error!("WebSocket ready notification failed: {}", e);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Wake channel forwarders still waiting on plugin output
    bus.close();

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}

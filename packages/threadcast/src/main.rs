use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use threadcast::config::{FileConfig, LiveConfig, ThreadcastConfig, load_config};
use threadcast::identity::ServerIdentity;
use threadcast::live::LiveContext;
use threadcast::metrics::ServerMetrics;
use threadcast::store::MemoryPostStore;
use threadcast::{AppState, build_router};

/// How long shutdown waits for live sessions to send their close frames.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "threadcast")]
#[command(about = "Live post distribution for discussion threads")]
struct Cli {
    /// Custom data directory (defaults to ~/.threadcast)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Host to bind to (overrides config.toml)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config.toml; 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "threadcast=debug,tower_http=debug,info"
    } else {
        "threadcast=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting threadcast");

    let config = ThreadcastConfig::new(cli.data_dir)?;
    let file_config: FileConfig = load_config(&config.data_dir)
        .extract()
        .with_context(|| format!("invalid configuration in {}", config.config_toml_path().display()))?;
    let live_config = LiveConfig::from_file(&file_config.live);

    let identity = ServerIdentity::load_or_generate(&config.data_dir)?;
    let metrics = Arc::new(ServerMetrics::new());
    let store = Arc::new(MemoryPostStore::new(file_config.posts.max_content_chars));
    let live = LiveContext::new(
        store,
        identity.token_issuer(live_config.token_ttl),
        metrics.clone(),
        live_config.send_channel_capacity,
    );

    let shutdown = CancellationToken::new();
    let app = build_router(AppState::new(live, shutdown.clone()));

    let host = cli.host.unwrap_or(file_config.server.host);
    let port = cli.port.unwrap_or(file_config.server.port);
    let addr = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("threadcast listening on http://{}", actual_addr);
    info!("Endpoints:");
    info!("  WS     /api/boards/:board/threads/:threadId       - Live thread");
    info!("  POST   /api/boards/:board/threads/:threadId/posts - Create post");
    info!("  GET    /health, /health/live, /metrics");

    // Create shutdown signal handler
    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, closing live connections...");
            shutdown.cancel();
        }
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    drain_sessions(&metrics).await;
    info!("Shutdown complete");
    server_result
}

async fn drain_sessions(metrics: &ServerMetrics) {
    let deadline = tokio::time::Instant::now() + SESSION_DRAIN_TIMEOUT;
    loop {
        let active = metrics.snapshot().connections.active;
        if active == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(active, "live sessions still open at shutdown");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

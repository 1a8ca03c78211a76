//! turnstream - streaming conversation exchange engine
//!
//! Builds conversation messages token by token from incoming streams, keeps
//! them in a shared thread, and hands the turn back to the operator when a
//! responder signals it is done.

mod api;
mod builder;
mod config;
mod exchange;
mod poller;
mod reload;
mod snapshot;
mod thread;
mod tokenizer;
mod upstream;

use api::{create_router, AppState};
use config::EngineConfig;
use exchange::Exchange;
use poller::{ChangePoller, FileModificationSource};
use snapshot::{JsonFileSnapshot, SnapshotStore};
use std::net::SocketAddr;
use std::sync::Arc;
use thread::ThreadStore;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upstream::{HttpReplySource, ReplySource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstream=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = EngineConfig::from_env()?;

    if let Some(parent) = config.snapshot_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let exchange = Arc::new(Exchange::new(
        Arc::new(ThreadStore::new()),
        config.exchange_context(),
    ));
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(JsonFileSnapshot::new(config.snapshot_path.clone()));

    // A broken snapshot at startup is not fatal; the thread starts empty
    tracing::info!(path = %config.snapshot_path.display(), "Loading snapshot");
    match reload::reload_once(&exchange, snapshots.as_ref()).await {
        Ok(phase) => tracing::info!(
            messages = exchange.store().snapshot().messages.len(),
            phase = phase.name(),
            "Thread loaded"
        ),
        Err(e) => tracing::error!(error = %e, "Initial snapshot load failed"),
    }

    let (poller, notices) = ChangePoller::spawn(
        FileModificationSource::new(config.snapshot_path.clone()),
        config.poll_interval,
    );
    let reload_task = {
        let exchange = Arc::clone(&exchange);
        let snapshots = Arc::clone(&snapshots);
        tokio::spawn(async move {
            reload::run_reload_loop(&exchange, snapshots.as_ref(), notices).await;
        })
    };

    let upstream: Option<Arc<dyn ReplySource>> = config.upstream_url.as_ref().map(|url| {
        tracing::info!(url = %url, "Upstream reply service configured");
        Arc::new(HttpReplySource::new(url.clone())) as Arc<dyn ReplySource>
    });
    if upstream.is_none() {
        tracing::warn!("No upstream reply service. Set TURNSTREAM_UPSTREAM_URL to enable replies.");
    }

    let state = AppState::new(
        Arc::clone(&exchange),
        snapshots,
        poller.baseline(),
        upstream,
        config.tokenizer_config(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("turnstream listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop().await;
    reload_task.await?;
    tracing::info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

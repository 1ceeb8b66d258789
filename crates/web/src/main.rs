//! Life Science Feed Presentation Layer
//!
//! Serves assembled page data for the site:
//! - Home, section landing and article detail pages
//! - Paths of every page that can be generated ahead of time
//!
//! Page data is read from the content API and kept for the revalidation
//! period.

mod cache;
mod handlers;
mod pages;

use axum::{middleware::from_fn, routing::get, Router};
use cache::PageCache;
use lsfeed_common::{
    config::{AppConfig, ObservabilityConfig},
    errors::Result,
    metrics,
};
use pages::PageLoader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pages: Arc<PageLoader>,
    pub cache: Arc<PageCache>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let pages = PageLoader::new(&config.web)?;
        let cache = PageCache::new(config.web.revalidate(), config.web.cache_max_entries);
        Ok(Self {
            pages: Arc::new(pages),
            cache: Arc::new(cache),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting Life Science Feed web v{}", lsfeed_common::VERSION);
    info!(
        content_api = %config.web.content_api_url,
        revalidate_secs = config.web.revalidate_secs,
        "Reading content"
    );

    metrics::install_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    let state = AppState::new(&config)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.web.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/pages/home", get(handlers::pages::home))
        .route("/pages/{section}/{slug}", get(handlers::pages::section))
        .route(
            "/pages/therapy-area/{therapy_area}/{slug}",
            get(handlers::pages::article),
        )
        .route("/paths", get(handlers::pages::paths))
        .layer(from_fn(metrics::track_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

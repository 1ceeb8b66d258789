//! Life Science Feed Content Store
//!
//! REST API over the content store. Handles:
//! - Articles and the three taxonomies (Strapi-compatible queries)
//! - Translation of new and edited articles into the target locales
//! - Seeding the default therapy areas at startup
//! - Admin auth on writes, rate limiting, logging and metrics

mod envelope;
mod handlers;
mod middleware;
mod query;

use axum::{
    error_handling::HandleErrorLayer,
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    BoxError, Router,
};
use envelope::Envelope;
use lsfeed_common::{
    auth::AdminGuard,
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    errors::AppError,
    lifecycle::{ArticleLifecycle, ArticleService},
    metrics,
    seed::seed_therapy_areas,
    store::ContentStore,
    translation::{create_translator, Translator},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ContentStore>,
    pub articles: Arc<ArticleService>,
    pub admin: Arc<AdminGuard>,
    pub envelope: Envelope,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ContentStore>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let lifecycle = ArticleLifecycle::from_config(translator, &config.translation);
        Self {
            articles: Arc::new(ArticleService::new(store.clone(), lifecycle)),
            admin: Arc::new(AdminGuard::new(config.auth.admin_token.as_deref())),
            envelope: Envelope::new(config.content.response_shape),
            store,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<AdminGuard> {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);
    init_tracing(&config.observability);

    info!("Starting Life Science Feed content store v{}", lsfeed_common::VERSION);

    metrics::install_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }
    let store: Arc<dyn ContentStore> = Arc::new(Repository::new(db));

    let translator = create_translator(&config.translation)?;
    info!(
        provider = translator.provider_name(),
        targets = ?config.translation.target_locales,
        "Translator ready"
    );

    // Bootstrap: a failed seed aborts startup
    if config.seed.enabled {
        let report = seed_therapy_areas(store.as_ref(), &config.seed.therapy_areas).await?;
        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            "Therapy areas seeded"
        );
    }

    let state = AppState::new(config.clone(), store, translator);
    if !state.admin.is_enabled() {
        warn!("auth.admin_token is not set; write routes are open");
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
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

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            AppError::ServiceUnavailable {
                message: format!("Request failed: {}", err),
            }
        }))
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    let mut api = handlers::api_routes();
    if state.config.rate_limit.enabled {
        let limit = middleware::rate_limit::RateLimit::new(&state.config.rate_limit);
        api = api.layer(from_fn_with_state(limit, middleware::rate_limit::rate_limit));
    }

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api)
        .layer(from_fn(metrics::track_requests))
        .layer(timeout)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
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

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use lsfeed_common::store::MemoryStore;
    use lsfeed_common::translation::PrefixTranslator;
    use serde_json::Value;
    use tower::ServiceExt;

    pub const ADMIN_TOKEN: &str = "test-admin-token";

    /// Router over an in-memory store with the prefix translator
    pub fn app_with(
        configure: impl FnOnce(&mut AppConfig),
    ) -> (Router, Arc<MemoryStore>) {
        let mut config = AppConfig::default();
        config.auth.admin_token = Some(ADMIN_TOKEN.to_string());
        config.rate_limit.enabled = false;
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            Arc::new(config),
            store.clone(),
            Arc::new(PrefixTranslator::new()),
        );
        (create_router(state), store)
    }

    pub fn app() -> (Router, Arc<MemoryStore>) {
        app_with(|_| {})
    }

    pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub fn json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_store_outage() {
        let (app, store) = app();
        let (status, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        store.set_unavailable(true);
        let (status, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["database"]["status"], "down");
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let (app, _) = app();
        let response = tower::ServiceExt::oneshot(
            app,
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_over_burst() {
        let (app, _) = app_with(|c| {
            c.rate_limit.enabled = true;
            c.rate_limit.requests_per_second = 1;
            c.rate_limit.burst = 1;
        });

        let (first, _) = send(&app, get("/api/categories")).await;
        assert_eq!(first, StatusCode::OK);

        let (second, body) = send(&app, get("/api/categories")).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");

        // health is outside the limited routes
        let (health, _) = send(&app, get("/health")).await;
        assert_eq!(health, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (app, _) = app();
        let (status, _) = send(&app, get("/api/authors")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

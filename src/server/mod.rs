//! HTTP surface: router, shared state, and the serve loop.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /` | [`handlers::root`] |
//! | `POST /api/academic/parse` | [`handlers::parse_academic`] |
//! | `GET {static_base_url}/academic/*` | `ServeDir` over the store root |

pub mod handlers;

use crate::config::ServerConfig;
use crate::converter::Converter;
use crate::error::ReaderError;
use crate::lifecycle;
use crate::service::IngestionService;
use crate::store::DocumentStore;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use handlers::{parse_academic, root, RootResponse};

/// Route of the upload endpoint.
pub const PARSE_ROUTE: &str = "/api/academic/parse";

/// Allowance on top of the upload limit for multipart boundaries and part
/// headers. Uploads are still checked against the exact limit after reading.
const MULTIPART_FRAMING_BYTES: usize = 64 * 1024;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<IngestionService>,
    pub converter: Arc<Converter>,
    pub store: Arc<DocumentStore>,
}

impl AppState {
    /// Wire the store and ingestion service for `config` around `converter`.
    pub fn new(config: &ServerConfig, converter: Arc<Converter>) -> Self {
        let store = Arc::new(DocumentStore::new(
            config.academic_root(),
            config.static_base_url.clone(),
        ));
        let service = Arc::new(IngestionService::new(
            Arc::clone(&converter),
            Arc::clone(&store),
            config.max_upload_bytes,
        ));
        Self {
            service,
            converter,
            store,
        }
    }
}

/// Build the router with every endpoint and middleware.
pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
    let static_files = ServeDir::new(state.store.root());

    Router::new()
        .route("/", get(root))
        .route(PARSE_ROUTE, post(parse_academic))
        .nest_service(&config.academic_static_prefix(), static_files)
        // Middleware
        .layer(DefaultBodyLimit::max(
            config.max_upload_bytes.saturating_add(MULTIPART_FRAMING_BYTES),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.frontend_url.as_deref()))
        .with_state(state)
}

/// CORS for the browser frontend: one allowed origin, credentials allowed.
fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let Some(url) = frontend_url else {
        return layer;
    };
    match HeaderValue::from_str(url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring frontend URL '{}' for CORS: {}", url, e);
            layer
        }
    }
}

/// Run the service on `config.bind_addr` with the default pdfium engine
/// until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig) -> Result<(), ReaderError> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| ReaderError::Internal(format!("failed to bind {}: {e}", config.bind_addr)))?;
    let converter = Arc::new(Converter::pdfium(config.engine.clone()));
    run(listener, config, converter, shutdown_signal()).await
}

/// Run the service on an already bound listener until `shutdown` resolves.
///
/// Startup (storage root, engine warm-up) completes before the first
/// connection is accepted; the shutdown purge runs after in-flight requests
/// have drained.
pub async fn run<F>(
    listener: TcpListener,
    config: ServerConfig,
    converter: Arc<Converter>,
    shutdown: F,
) -> Result<(), ReaderError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(&config, converter);
    let readiness = lifecycle::startup(&state.store, &state.converter).await?;

    let app = build_router(&config, state.clone());
    let addr = listener
        .local_addr()
        .map_err(|e| ReaderError::Internal(format!("listener has no local address: {e}")))?;
    info!(
        "Listening on http://{} (engine {}, storage {})",
        addr,
        readiness.as_str(),
        state.store.root().display()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ReaderError::Internal(format!("server error: {e}")));

    lifecycle::shutdown(Arc::clone(&state.store), config.cleanup_on_exit).await;
    served
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

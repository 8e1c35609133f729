//! API server implementation.
//!
//! Provides health, ready, metrics, and the `/api/v1` schedule and upload
//! endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use xalo_core::storage::{MemoryBackend, StorageBackend};
use xalo_core::sweep::{sweep_orphans, SweepOptions};
use xalo_core::{Error, Result, ScheduleService, UploadStore};

use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    storage: Arc<dyn StorageBackend>,
    schedules: ScheduleService,
    uploads: Arc<UploadStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("storage", &"<StorageBackend>")
            .field("uploads", &self.uploads)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates application state over the given storage backend.
    #[must_use]
    pub fn new(config: Config, storage: Arc<dyn StorageBackend>) -> Self {
        let schedules = ScheduleService::with_backend(Arc::clone(&storage));
        let uploads = Arc::new(
            UploadStore::new(Arc::clone(&storage), config.public_base_url())
                .with_max_bytes(config.uploads.max_bytes),
        );
        Self {
            config,
            storage,
            schedules,
            uploads,
        }
    }

    /// Creates application state with in-memory storage (for testing).
    #[must_use]
    pub fn with_memory_storage(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryBackend::new()))
    }

    /// Schedule resource handler.
    #[must_use]
    pub fn schedules(&self) -> &ScheduleService {
        &self.schedules
    }

    /// Upload store.
    #[must_use]
    pub fn uploads(&self) -> &Arc<UploadStore> {
        &self.uploads
    }

    /// Sweep options derived from configuration.
    #[must_use]
    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            grace: self.config.sweep_grace(),
            dry_run: false,
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn root() -> &'static str {
    "Xalo English API is running..."
}

/// Health check endpoint handler.
///
/// Shallow liveness check; dependencies are not touched.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// A `HEAD` on a missing key exercises the storage path without listing.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.storage.head("__xalo/ready-check").await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!("storage check failed: {e}")),
            }),
        ),
    }
}

// ============================================================================
// Server
// ============================================================================

/// The Xalo API server.
pub struct Server {
    config: Config,
    storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("storage", &"<StorageBackend>")
            .finish()
    }
}

impl Server {
    /// Creates a new server with in-memory storage.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            storage: Arc::new(MemoryBackend::new()),
        }
    }

    /// Creates a new server with an explicit storage backend.
    #[must_use]
    pub fn with_storage_backend(config: Config, storage: Arc<dyn StorageBackend>) -> Self {
        Self { config, storage }
    }

    /// Creates a new `ServerBuilder`.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn create_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(self.config.clone(), Arc::clone(&self.storage)))
    }

    fn create_router(&self, state: Arc<AppState>) -> Router {
        let cors = self.build_cors_layer();

        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .nest(
                "/api/v1",
                crate::routes::api_v1_routes(self.config.uploads.max_bytes),
            )
            // Order matters: metrics outermost for timing, then request id, trace, CORS.
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(crate::context::request_id_middleware))
            .layer(middleware::from_fn(crate::metrics::metrics_middleware))
            .with_state(state)
    }

    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.config.cors;
        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("x-request-id"),
                header::HeaderName::from_static("x-user-id"),
                header::HeaderName::from_static("x-user-role"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::HeaderName::from_static("x-request-id"),
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds));
        Self::apply_cors_allowed_origins(cors, cors_config)
    }

    fn apply_cors_allowed_origins(cors: CorsLayer, cors_config: &CorsConfig) -> CorsLayer {
        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
            if cors_config.allowed_origins.len() == 1 {
                return cors.allow_origin(Any);
            }
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let allowed: Vec<HeaderValue> = cors_config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::error!(origin = %origin, "Invalid CORS origin; skipping");
                    None
                }
            })
            .collect();

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until shutdown (Ctrl-C / SIGTERM).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server cannot
    /// bind to the port.
    pub async fn serve(&self) -> Result<()> {
        self.config.validate()?;
        crate::metrics::init_metrics();

        let state = self.create_state();
        let router = self.create_router(Arc::clone(&state));

        let sweeper = self
            .config
            .sweep
            .interval_secs
            .map(|secs| spawn_sweep_task(Arc::clone(&state), Duration::from_secs(secs)));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        tracing::info!(
            http_port = self.config.http_port,
            debug = self.config.debug,
            "Starting Xalo API server"
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal {
                message: format!("failed to bind to {addr}: {e}"),
            })?;

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal {
                message: format!("server error: {e}"),
            });

        if let Some(handle) = sweeper {
            handle.abort();
        }
        tracing::info!("Server stopped");
        result
    }

    /// Creates a test router for the server.
    ///
    /// Builds the full router over this server's storage backend without
    /// binding a port.
    #[doc(hidden)]
    pub fn test_router(&self) -> Router {
        self.create_router(self.create_state())
    }
}

/// Runs the orphan sweep every `every`, skipping the immediate first tick.
fn spawn_sweep_task(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tracing::info!(interval_secs = every.as_secs(), "Periodic orphan sweep enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep_orphans(state.uploads(), state.schedules(), state.sweep_options()).await {
                Ok(report) => crate::metrics::record_sweep_removed(report.removed.len()),
                Err(e) => tracing::error!(error = %e, "Periodic orphan sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Builder for constructing a server.
pub struct ServerBuilder {
    config: Config,
    storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("storage", &"<StorageBackend>")
            .finish()
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            storage: Arc::new(MemoryBackend::new()),
        }
    }
}

impl ServerBuilder {
    /// Creates a new server builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the HTTP port.
    #[must_use]
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Enables debug mode (header-based identity instead of JWT).
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the JWT HS256 secret used for bearer token verification.
    #[must_use]
    pub fn jwt_hs256_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt.hs256_secret = Some(secret.into());
        self
    }

    /// Sets the public base URL used in issued upload URLs.
    #[must_use]
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.uploads.public_base_url = Some(url.into());
        self
    }

    /// Sets the upload size limit.
    #[must_use]
    pub fn upload_max_bytes(mut self, max_bytes: usize) -> Self {
        self.config.uploads.max_bytes = max_bytes;
        self
    }

    /// Sets the storage backend used by request handlers.
    #[must_use]
    pub fn storage_backend(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = storage;
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config,
            storage: self.storage,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() -> Result<()> {
        let router = ServerBuilder::new().build().test_router();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let health: HealthResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert_eq!(health.status, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn ready_endpoint() -> Result<()> {
        let router = ServerBuilder::new().build().test_router();

        let request = Request::builder()
            .uri("/ready")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let ready: ReadyResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert!(ready.ready);
        Ok(())
    }

    #[tokio::test]
    async fn root_banner() -> Result<()> {
        let router = ServerBuilder::new().build().test_router();
        let request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await?;
        assert_eq!(&body[..], b"Xalo English API is running...");
        Ok(())
    }

    #[tokio::test]
    async fn responses_carry_request_id() -> Result<()> {
        let router = ServerBuilder::new().build().test_router();

        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "req-123")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await?;
        assert_eq!(
            response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("req-123")
        );
        Ok(())
    }

    #[tokio::test]
    async fn cors_preflight_allows_site_origin() -> Result<()> {
        let router = ServerBuilder::new().build().test_router();

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/schedules")
            .header("origin", "https://xalo.edu.vn")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await?;
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("https://xalo.edu.vn")
        );
        Ok(())
    }

    #[tokio::test]
    async fn serve_rejects_production_without_secret() {
        let server = ServerBuilder::new().build();
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}

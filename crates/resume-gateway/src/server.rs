//! HTTP front door for the relay
//!
//! Routes:
//! - `GET /healthz` liveness
//! - `POST /api/upload` buffered scoring
//! - `POST /api/upload_stream` streamed scoring

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::cors::{CorsPolicy, cors_middleware};
use crate::error::{GatewayError, Result};
use crate::relay::{RelayError, ScoringRelay, UploadRequest};

/// Shared application state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Outbound relay (HTTP client plus upstream settings)
    pub relay: ScoringRelay,
    /// Maximum inbound request body size
    pub max_upload_bytes: usize,
    /// Cross-origin policy
    pub cors: Arc<CorsPolicy>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_relay(ScoringRelay::new(config.upstream.clone())?, config))
    }

    /// Build state around an existing relay, e.g. one with a custom client
    pub fn with_relay(relay: ScoringRelay, config: &Config) -> Self {
        Self {
            relay,
            max_upload_bytes: config.server.max_upload_bytes,
            cors: Arc::new(CorsPolicy::from_config(&config.cors)),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the server and listen for requests until shutdown
    pub async fn serve(&self) -> Result<()> {
        let state = Arc::new(AppState::from_config(&self.config)?);
        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr()
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting resume gateway on {addr}");
        tracing::info!(
            "Scoring service: {} (buffered {}, streamed {})",
            self.config.upstream.ml_url,
            self.config.upstream.score_path,
            self.config.upstream.stream_path
        );
        tracing::info!("CORS profile: {:?}", self.config.cors.profile);
        tracing::info!(
            "Max upload size: {} bytes",
            self.config.server.max_upload_bytes
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Resume gateway shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes and layers configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = state.cors.clone();
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/upload_stream", post(upload_stream_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(cors, cors_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness only
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

/// Relay the upload and return the scoring result as one JSON payload
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, RelayError> {
    let upload = UploadRequest::from_extracted(multipart).await?;
    let (jd_text, file) = upload.into_parts().await?;

    let scored = state.relay.relay_buffered(jd_text, file).await?;

    Ok((
        scored.status,
        [(header::CONTENT_TYPE, scored.content_type)],
        scored.body,
    )
        .into_response())
}

/// Relay the upload and stream the scoring events back as they arrive.
///
/// Errors before the downstream call are JSON; once the headers below are
/// sent the only in-band failure signal is the stream error event.
async fn upload_stream_handler(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, RelayError> {
    let upload = UploadRequest::from_extracted(multipart).await?;
    let (jd_text, file) = upload.into_parts().await?;

    let stream = state.relay.relay_streamed(jd_text, file).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        let config = Config::default();
        let relay = ScoringRelay::with_client(reqwest::Client::new(), config.upstream.clone());
        Arc::new(AppState::with_relay(relay, &config))
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_missing_jd_text() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"jd_text": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(json["error"], "missing jd_text");
    }

    #[tokio::test]
    async fn test_unknown_route_not_found() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_upload_not_allowed() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/upload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

//! HTTP server for Astral
//!
//! Serves the OAuth endpoints plus health and metrics.

pub mod template;

use crate::auth::{OAuthServerState, OAuthService, create_credential_store, create_oauth_routes};
use crate::config::{Config, HttpConfig};
use crate::storage::create_storage_from_config;
use crate::{AstralError, Result};
use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Error type for non-OAuth HTTP handlers
#[derive(Debug)]
pub struct AppError(AstralError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log full error details internally
        tracing::error!("Internal error: {:?}", self.0);

        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = json!({
            "error": {
                "type": "internal_error",
                "message": "An internal error occurred",
                "status": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<AstralError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Build the OAuth service and its dependencies from configuration
pub async fn create_oauth_state(config: &Config) -> Result<OAuthServerState> {
    let storage = create_storage_from_config(&config.storage).await?;
    let credentials = create_credential_store(&config.credentials)?;
    let service = OAuthService::new(storage, credentials, config.clients().to_vec());
    Ok(OAuthServerState::new(Arc::new(service)))
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    config.validate()?;
    let http_config = config.http_or_default();

    let state = create_oauth_state(&config).await?;
    let app = build_router(state, &http_config)?;

    // Determine bind address
    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| AstralError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!(
        clients = config.clients().len(),
        storage = %config.storage.driver,
        credentials = %config.credentials.driver,
        "Starting HTTP server on {}",
        socket_addr
    );

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AstralError::config(format!("Server error: {}", e)))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Build the router with all endpoints
pub fn build_router(state: OAuthServerState, http_config: &HttpConfig) -> Result<Router> {
    let cors = cors_layer(http_config)?;

    let router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(create_oauth_routes(state))
        .route_layer(axum::middleware::from_fn(crate::telemetry::track_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().include_headers(false))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors),
        );

    Ok(router)
}

/// CORS policy from `http.allowedOrigins`, defaulting to the local origins
fn cors_layer(http_config: &HttpConfig) -> Result<CorsLayer> {
    let origins = match &http_config.allowed_origins {
        Some(origins) => origins.clone(),
        None => vec![
            format!("http://localhost:{}", http_config.port),
            format!("http://127.0.0.1:{}", http_config.port),
        ],
    };

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| AstralError::config(format!("Invalid CORS origin {}: {}", o, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

// ============================================================================
// SYSTEM HANDLERS
// ============================================================================

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}

#[cfg(test)]
mod template_test;

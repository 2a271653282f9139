//! HTTP server exposing the built search index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search-index` | `{ "fuse": <artifact> }`, built on first request |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Errors use the body `{ "error": { "code": "internal", "message": "..." } }`.
//! All origins, methods and headers are permitted so browser clients can
//! fetch the index directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::serve::QueryLayer;

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    query: Arc<QueryLayer>,
}

/// Build the router. Split out from [`run_server`] so it can be mounted
/// elsewhere.
pub fn router(query: Arc<QueryLayer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search-index", get(handle_search_index))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { query })
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config, query: Arc<QueryLayer>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(query);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Search index server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn internal(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        error!(error = %message, "Search index request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search-index ============

async fn handle_search_index(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let result = state
        .query
        .query_site_search_index()
        .await
        .map_err(AppError::internal)?;
    Ok(Json(result))
}

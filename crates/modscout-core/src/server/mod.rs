//! JSON-over-HTTP surface for the engine.
//!
//! ```text
//! GET  /health                      -> HealthStatus (200 even when degraded)
//! POST /tools/search_modules        -> SearchResults
//! POST /tools/get_module_details    -> ModuleDetail
//! POST /tools/list_content          -> ContentListing
//! POST /tools/get_content           -> ContentBundle
//! ```
//!
//! Errors are rendered as [`ErrorResponse`] with a status derived from the
//! error kind.

pub mod types;

pub use types::*;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::content::{ContentBundle, ContentListing};
use crate::engine::ModuleEngine;
use crate::error::EngineError;
use crate::health::HealthStatus;
use crate::registry::{ModuleDetail, SearchResults};

/// Shared state for route handlers.
pub struct AppState {
    pub engine: ModuleEngine,
}

impl AppState {
    pub fn new(engine: ModuleEngine) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/tools/search_modules", post(handle_search_modules))
        .route("/tools/get_module_details", post(handle_get_module_details))
        .route("/tools/list_content", post(handle_list_content))
        .route("/tools/get_content", post(handle_get_content))
        .with_state(state)
}

/// Serve on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Tool server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Tool server shutting down");
        })
        .await
}

/// HTTP status for an engine error.
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidReference { .. } | EngineError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
        EngineError::ModuleNotFound { .. }
        | EngineError::RefNotFound { .. }
        | EngineError::PathNotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::SourceUnresolvable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::RegistryUnavailable { .. } | EngineError::RepositoryUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Handler error wrapper rendering [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "Tool request failed upstream");
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.engine.health().await)
}

async fn handle_search_modules(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SearchModulesRequest>, JsonRejection>,
) -> ApiResult<SearchResults> {
    let Json(req) = body?;
    Ok(Json(state.engine.search_modules(&req.query, req.limit).await?))
}

async fn handle_get_module_details(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ModuleRequest>, JsonRejection>,
) -> ApiResult<ModuleDetail> {
    let Json(req) = body?;
    Ok(Json(state.engine.get_module_details(&req.module_id).await?))
}

async fn handle_list_content(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ModuleRequest>, JsonRejection>,
) -> ApiResult<ContentListing> {
    let Json(req) = body?;
    Ok(Json(state.engine.list_content(&req.module_id).await?))
}

async fn handle_get_content(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GetContentRequest>, JsonRejection>,
) -> ApiResult<ContentBundle> {
    let Json(req) = body?;
    let bundle = state
        .engine
        .get_content(
            &req.module_id,
            &req.path,
            &req.include_files,
            req.exclude_files.as_deref(),
        )
        .await?;
    Ok(Json(bundle))
}

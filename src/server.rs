//! HTTP API over the catalog.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/apis?scope=&project_id=&stage=&limit=` | Metadata listing, newest first |
//! | `POST` | `/search` | Semantic search: `{scope, project_id?, stage?, query, limit?}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use api_catalog_core::embedding::Embedder;
use api_catalog_core::models::StageFilter;
use api_catalog_core::query::{dispatch, resolve_scope, QueryOutcome, QueryRequest};
use api_catalog_core::store::Catalog;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteCatalog;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<dyn Catalog>,
    embedder: Arc<dyn Embedder>,
    default_limit: i64,
}

impl AppState {
    pub fn new(catalog: Arc<dyn Catalog>, embedder: Arc<dyn Embedder>, default_limit: i64) -> Self {
        Self {
            catalog,
            embedder,
            default_limit,
        }
    }
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    let state = AppState::new(
        Arc::new(SqliteCatalog::new(pool)),
        embedder,
        config.query.default_limit,
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server started");
    println!("apicat server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/apis", get(handle_list))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state)
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

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    error!(error = %msg, "query failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: msg,
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

// ============ GET /apis ============

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

fn build_request(
    state: &AppState,
    scope: Option<&str>,
    project_id: Option<&str>,
    stage: Option<&str>,
    query: Option<String>,
    limit: Option<i64>,
) -> Result<QueryRequest, AppError> {
    let scope = resolve_scope(scope.unwrap_or("all"), project_id)
        .map_err(|e| bad_request(e.to_string()))?;
    let stage = match stage {
        Some(token) => StageFilter::parse(token).map_err(|e| bad_request(e.to_string()))?,
        None => StageFilter::Unspecified,
    };
    let limit = limit.unwrap_or(state.default_limit);
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }
    Ok(QueryRequest {
        scope,
        stage,
        query,
        limit,
    })
}

pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<QueryOutcome>, AppError> {
    let req = build_request(
        &state,
        params.scope.as_deref(),
        params.project_id.as_deref(),
        params.stage.as_deref(),
        None,
        params.limit,
    )?;
    let outcome = dispatch(state.catalog.as_ref(), state.embedder.as_ref(), &req)
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    query: String,
    #[serde(default)]
    limit: Option<i64>,
}

pub async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<QueryOutcome>, AppError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if state.embedder.model_name() == "disabled" {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            code: "embeddings_disabled".to_string(),
            message: "semantic search requires an embedding provider; set [embedding].provider"
                .to_string(),
        });
    }
    let req = build_request(
        &state,
        body.scope.as_deref(),
        body.project_id.as_deref(),
        body.stage.as_deref(),
        Some(query.to_string()),
        body.limit,
    )?;
    let outcome = dispatch(state.catalog.as_ref(), state.embedder.as_ref(), &req)
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}

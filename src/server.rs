//! HTTP trigger for crawl runs.
//!
//! A scheduler (cron, a hosted function runner, a CI job) calls
//! `POST /crawl` to run one bounded batch and receives the [`RunResult`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/crawl` | Run one crawl batch |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! ```json
//! { "success": true, "results": { "processed": 30, "documents": 21, "errors": 2, "newUrls": 57 },
//!   "message": "Crawl completed" }
//! ```
//!
//! A run that cannot start (sources unreadable, queue unreachable) returns
//! HTTP 500 with `{ "success": false, "error": "..." }`.
//!
//! # CORS
//!
//! All origins, methods and headers are permitted, so browser preflight
//! (`OPTIONS`) requests succeed.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::crawler::Crawler;
use crate::models::RunResult;
use crate::store::SqliteStore;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    crawler: Arc<Crawler>,
}

/// Build the router around an existing crawler.
pub fn router(crawler: Arc<Crawler>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/crawl", post(handle_crawl))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { crawler })
}

/// Starts the HTTP trigger on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(config).await?;
    let crawler = Crawler::from_config(config, Arc::new(store))?;
    let app = router(Arc::new(crawler));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Crawl trigger listening on http://{}", bind_addr);
    println!("  POST /crawl   run one batch");
    println!("  GET  /health  health check");

    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Run-level failure, rendered as HTTP 500.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %format!("{:#}", self.0), "crawl run failed");
        let body = ErrorBody {
            success: false,
            error: format!("{:#}", self.0),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError(err)
    }
}

// ============ POST /crawl ============

#[derive(Serialize)]
struct CrawlResponse {
    success: bool,
    results: RunResult,
    message: String,
}

async fn handle_crawl(State(state): State<AppState>) -> Result<Json<CrawlResponse>, AppError> {
    let results = state.crawler.run_batch().await?;
    Ok(Json(CrawlResponse {
        success: true,
        results,
        message: format!(
            "Crawl completed: {} processed, {} documents, {} errors, {} new URLs",
            results.processed, results.documents, results.errors, results.new_urls
        ),
    }))
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

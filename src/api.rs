//! HTTP API
//!
//! Fire-and-forget task triggers plus a coarse progress view (the files in
//! the output directory). Task failures only show up in the logs.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::{error, info};

use crate::config::DEFAULT_REFERENCE_PRICES_URL;
use crate::service::{ScrapeRequest, ScraperService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: ScraperService,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(service: ScraperService) -> Self {
        let output_dir = service.config().output_dir.clone();
        Self {
            service,
            output_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootResponse {
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/files", get(list_files))
        .route("/health", get(health))
        .route("/start-scrape", post(start_scrape))
        .route("/start-download", post(start_download))
        .with_state(state)
}

/// Start the HTTP API server
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);

    info!("HTTP API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Reference price scraper API is running".to_string(),
        files: output_files(&state.output_dir),
    })
}

async fn list_files(State(state): State<AppState>) -> Json<FilesResponse> {
    Json(FilesResponse {
        files: output_files(&state.output_dir),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

async fn start_scrape(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> (StatusCode, Json<StartResponse>) {
    let url = params
        .url
        .unwrap_or_else(|| DEFAULT_REFERENCE_PRICES_URL.to_string());
    info!("Received request to start scrape task for URL: {}", url);

    spawn_task(state.service, ScrapeRequest::reference_prices(url));
    accepted("Scrape task started")
}

async fn start_download(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<(StatusCode, Json<StartResponse>), (StatusCode, Json<StartResponse>)> {
    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(StartResponse {
                message: "url query parameter is required".to_string(),
                status: "rejected".to_string(),
            }),
        ));
    };
    info!("Received request to start download task for URL: {}", url);

    spawn_task(state.service, ScrapeRequest::file_download(url));
    Ok(accepted("Download task started"))
}

fn accepted(message: &str) -> (StatusCode, Json<StartResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(StartResponse {
            message: message.to_string(),
            status: "processing".to_string(),
        }),
    )
}

/// Runs the task detached; its outcome is only logged.
fn spawn_task(mut service: ScraperService, req: ScrapeRequest) {
    tokio::spawn(async move {
        let url = req.url.clone();
        match service.call(req).await {
            Ok(result) => info!("Task for {} finished: {:?}", url, result.output_path),
            Err(e) => error!("Task for {} failed: {}", url, e),
        }
    });
}

/// Names of regular files with an extension in `dir`, sorted. A missing or
/// unreadable directory lists as empty.
pub fn output_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains('.'))
        .collect();
    files.sort();
    files
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP API over the service surface

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::enrichment::{FileMove, SearchHit};
use crate::reader::parse_extensions;
use crate::scheduler::{FailedPath, FileSummary};
use crate::wizard::{ApplyReport, FailedBatch, FileWizard};
use crate::WizardError;

/// Shared application state
pub struct AppState {
    pub wizard: FileWizard,
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get_files", get(get_files))
        .route("/get_summaries", get(get_summaries))
        .route("/search_files", get(search_files))
        .route("/update_files", post(update_files))
        .route("/open_file", post(open_file))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct ApiError(WizardError);

impl From<WizardError> for ApiError {
    fn from(e: WizardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            WizardError::NotFound(_) | WizardError::MissingFile(_) => StatusCode::NOT_FOUND,
            WizardError::UnsafePath(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Deserialize)]
struct DirectoryQuery {
    root_path: PathBuf,
    #[serde(default)]
    recursive: bool,
    /// `;` separated, e.g. `pdf;docx`
    #[serde(default)]
    required_exts: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    root_path: PathBuf,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    required_exts: String,
    search_query: String,
}

#[derive(Serialize)]
struct ProposalResponse {
    root_path: PathBuf,
    items: Vec<FileMove>,
    failed: Vec<FailedPath>,
    failed_batches: Vec<FailedBatch>,
}

#[derive(Serialize)]
struct SummariesResponse {
    root_path: PathBuf,
    items: Vec<FileSummary>,
    failed: Vec<FailedPath>,
}

#[derive(Serialize)]
struct SearchResponse {
    root_path: PathBuf,
    items: Vec<SearchHit>,
    failed: Vec<FailedPath>,
    failed_batches: Vec<FailedBatch>,
}

#[derive(Deserialize)]
struct UpdateRequest {
    root_path: PathBuf,
    items: Vec<FileMove>,
}

#[derive(Deserialize)]
struct OpenRequest {
    file_path: PathBuf,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn get_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<ProposalResponse> {
    let exts = parse_extensions(&query.required_exts);
    let proposal = state
        .wizard
        .propose_reorganization(&query.root_path, query.recursive, &exts)
        .await?;
    Ok(Json(ProposalResponse {
        root_path: query.root_path,
        items: proposal.files,
        failed: proposal.failed,
        failed_batches: proposal.failed_batches,
    }))
}

async fn get_summaries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<SummariesResponse> {
    let exts = parse_extensions(&query.required_exts);
    let report = state.wizard.enrich_directory(&query.root_path, query.recursive, &exts).await?;
    Ok(Json(SummariesResponse {
        root_path: query.root_path,
        items: report.summaries,
        failed: report.failed,
    }))
}

async fn search_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let exts = parse_extensions(&query.required_exts);
    let report = state
        .wizard
        .search(&query.root_path, query.recursive, &exts, &query.search_query)
        .await?;
    Ok(Json(SearchResponse {
        root_path: query.root_path,
        items: report.files,
        failed: report.failed,
        failed_batches: report.failed_batches,
    }))
}

async fn update_files(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<ApplyReport> {
    let report = state.wizard.apply_moves(&request.root_path, &request.items).await?;
    Ok(Json(report))
}

async fn open_file(Json(request): Json<OpenRequest>) -> ApiResult<MessageResponse> {
    crate::opener::open_file(&request.file_path)?;
    Ok(Json(MessageResponse { message: "File opened successfully" }))
}

/// Serve the API until the process is stopped
pub async fn start_server(wizard: FileWizard) -> crate::Result<()> {
    let addr = format!("{}:{}", wizard.config().web.host, wizard.config().web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API available at http://{}", addr);

    let router = create_router(Arc::new(AppState { wizard }));
    axum::serve(listener, router)
        .await
        .map_err(|e| WizardError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

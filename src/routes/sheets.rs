use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AnalysisConfig, AnalysisResult, ChartSet, ColumnRole, Table},
    services::{
        analysis::{build_request, run_analysis},
        report::{build_report, ReportDocument},
        session::{CompletedAnalysis, SessionSnapshot},
        sheet::{classify_columns, utils::format_bytes, FileKind},
    },
    AppState,
};

/// Rows shown in the upload preview.
const PREVIEW_ROWS: usize = 8;

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/sheets", post(upload_sheet))
        .route("/sheets/:id", get(get_sheet).put(replace_sheet).delete(delete_sheet))
        .route("/sheets/:id/charts", get(get_charts))
        .route("/sheets/:id/analyze", post(analyze_sheet))
        .route("/sheets/:id/report", get(get_report))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ColumnSummary {
    name: String,
    roles: Vec<ColumnRole>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    session_id: Uuid,
    file_name: String,
    size_label: String,
    row_count: usize,
    column_count: usize,
    preview: Vec<Vec<String>>,
    columns: Vec<ColumnSummary>,
    charts: ChartSet,
}

impl UploadResponse {
    fn new(session_id: Uuid, file_name: String, size: usize, table: &Table, charts: ChartSet) -> Self {
        let roles = classify_columns(&table.headers);
        Self {
            session_id,
            file_name,
            size_label: format_bytes(size),
            row_count: table.row_count(),
            column_count: table.column_count(),
            preview: table.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
            columns: table
                .headers
                .iter()
                .enumerate()
                .map(|(i, name)| ColumnSummary {
                    name: name.clone(),
                    roles: roles.roles_of(i),
                })
                .collect(),
            charts,
        }
    }
}

fn validate_file_name(file_name: &str) -> Result<(), AppError> {
    if file_name.trim().is_empty() {
        return Err(AppError::InvalidInput("file_name must not be empty".to_string()));
    }
    FileKind::from_file_name(file_name).map(|_| ())
}

/// Parses `data` into the session, leaving it `Ready` or `Failed`.
async fn load_into_session(
    state: &Arc<AppState>,
    id: Uuid,
    file_name: &str,
    data: Bytes,
) -> Result<UploadResponse, AppError> {
    let start = std::time::Instant::now();
    let size = data.len();
    let ticket = state.sessions.begin_parsing(id, file_name)?;

    let parse_state = state.clone();
    let parse_name = file_name.to_string();
    let outcome = tokio::task::spawn_blocking(move || {
        parse_state.parser.parse_upload(&parse_name, &data)
    })
    .await
    .map_err(AppError::from)
    .and_then(|parsed| parsed);

    let table = state.sessions.finish_parsing(ticket, outcome)?;
    let charts = state.sessions.charts(id)?;
    tracing::info!("Sheet {} loaded into session {} in {:?}", file_name, id, start.elapsed());

    Ok(UploadResponse::new(id, file_name.to_string(), size, &table, charts.as_ref().clone()))
}

async fn upload_sheet(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    validate_file_name(&params.file_name)?;
    state.parser.check_size(body.len())?;

    let id = state.sessions.create();
    match load_into_session(&state, id, &params.file_name, body).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(err) => {
            // A failed first upload leaves nothing worth keeping.
            let _ = state.sessions.remove(id);
            Err(err)
        }
    }
}

async fn replace_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    validate_file_name(&params.file_name)?;
    state.parser.check_size(body.len())?;

    let response = load_into_session(&state, id, &params.file_name, body).await?;
    Ok(Json(response))
}

async fn get_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(id)?))
}

async fn get_charts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChartSet>, AppError> {
    let charts = state.sessions.charts(id)?;
    Ok(Json(charts.as_ref().clone()))
}

async fn analyze_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(config): Json<AnalysisConfig>,
) -> Result<Json<AnalysisResult>, AppError> {
    let config = config.normalized();

    let (ticket, table, file_name) = state.sessions.begin_analysis(id)?;
    tracing::info!(
        "Starting analysis for session {} (industry: {}, period: {})",
        id,
        config.industry,
        config.period
    );

    // Runs detached so a dropped connection cannot strand the session in
    // the analyzing state.
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let start = std::time::Instant::now();
        let outcome = match build_request(&table, &config) {
            Ok(request) => run_analysis(task_state.transport.as_ref(), &request).await,
            Err(err) => Err(err),
        };
        let outcome = outcome.map(|result| CompletedAnalysis {
            result,
            file_name,
            config,
            completed_at: Local::now(),
        });
        let finished = task_state.sessions.finish_analysis(ticket, outcome);
        tracing::info!("Analysis for session {} finished in {:?}", id, start.elapsed());
        finished
    });

    let analysis = task.await??;
    Ok(Json(analysis.result.clone()))
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportDocument>, AppError> {
    let analysis = state.sessions.latest_analysis(id)?;
    Ok(Json(build_report(&analysis)))
}

async fn delete_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    EmptyOrInvalidInput(String),

    #[error("Unsupported file type: {0}. Please upload CSV or Excel.")]
    UnsupportedFormat(String),

    #[error("Failed to read file: {0}")]
    ReadError(String),

    #[error("File size must be under {limit} bytes (got {size})")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Please add your Claude API key to the environment ({0}).")]
    MissingCredential(String),

    #[error("{0}")]
    RemoteFailure(String),

    #[error("An analysis is already running for this sheet")]
    AnalysisInProgress,

    #[error("No parsed table is available for this sheet")]
    NoTable,

    #[error("No completed analysis is available for this sheet")]
    NoAnalysis,

    #[error("Result discarded: the sheet was replaced while it was being processed")]
    Superseded,

    #[error("Sheet session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable tag, sent next to the message in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptyOrInvalidInput(_) => "empty_or_invalid_input",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::ReadError(_) => "read_error",
            AppError::FileTooLarge { .. } => "file_too_large",
            AppError::MissingCredential(_) => "missing_credential",
            AppError::RemoteFailure(_) => "remote_failure",
            AppError::AnalysisInProgress => "analysis_in_progress",
            AppError::NoTable => "no_table",
            AppError::NoAnalysis => "no_analysis",
            AppError::Superseded => "superseded",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::EmptyOrInvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::ReadError(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MissingCredential(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::AnalysisInProgress => StatusCode::CONFLICT,
            AppError::NoTable => StatusCode::CONFLICT,
            AppError::NoAnalysis => StatusCode::NOT_FOUND,
            AppError::Superseded => StatusCode::CONFLICT,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::ReadError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::ReadError(format!("CSV parse error: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} ({})", self, self.code());
        } else {
            tracing::warn!("{} ({})", self, self.code());
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

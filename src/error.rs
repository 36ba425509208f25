use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::model::ScoreError;

pub const NO_JSON: &str = "No JSON received from frontend";

/// Every variant is reported as HTTP 500 with an `{"error": ...}` envelope,
/// matching what existing frontends expect.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("{0}")]
    ScoringFailure(String),
    #[error("Static files not found")]
    StaticFolderMissing { path: String, absolute_path: String },
    #[error("Index file not found")]
    IndexMissing { files: Vec<String> },
}

impl From<ScoreError> for AppError {
    fn from(e: ScoreError) -> Self {
        match e {
            ScoreError::ModelUnavailable => AppError::ModelUnavailable,
            other => AppError::ScoringFailure(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!("request failed: {}", self);
        let body = match &self {
            AppError::StaticFolderMissing {
                path,
                absolute_path,
            } => json!({ "error": self.to_string(), "path": path, "absolute_path": absolute_path }),
            AppError::IndexMissing { files } => json!({ "error": self.to_string(), "files": files }),
            _ => json!({ "error": self.to_string() }),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

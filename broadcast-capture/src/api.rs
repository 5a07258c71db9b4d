use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestResponse {
    pub ingested: usize,
    pub invalid: usize,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct SearchResponse {
    pub events: Vec<Value>,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportResponse {
    pub url: String,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown event category: {0}")]
    UnknownCategory(String),

    #[error("missing or invalid api key")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage failure: {0}")]
    StorageError(String),
}

impl CaptureError {
    pub fn storage(context: &str, err: impl Display) -> Self {
        CaptureError::StorageError(format!("{context}: {err}"))
    }
}

impl From<sqlx::Error> for CaptureError {
    fn from(err: sqlx::Error) -> Self {
        CaptureError::storage("index query failed", err)
    }
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        match self {
            CaptureError::RequestDecodingError(_)
            | CaptureError::RequestParsingError(_)
            | CaptureError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            CaptureError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),

            CaptureError::UnknownCategory(_) | CaptureError::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }

            CaptureError::StorageError(_) => {
                tracing::error!("request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}

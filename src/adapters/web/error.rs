//! HTTP error responses for the web adapter.

use axum::{
    Json,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::domain::error::IndexwatchError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<IndexwatchError> for WebError {
    fn from(err: IndexwatchError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

/// Extractor rejections keep axum's status and message but use the JSON body.
macro_rules! from_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for WebError {
                fn from(rejection: $rejection) -> Self {
                    Self::new(rejection.status(), rejection.body_text())
                }
            }
        )*
    };
}

from_rejection!(JsonRejection, MultipartRejection, PathRejection);

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

pub fn status_from_error(err: &IndexwatchError) -> StatusCode {
    match err {
        IndexwatchError::ConfigMissing { .. }
        | IndexwatchError::ConfigInvalid { .. }
        | IndexwatchError::ConfigParse { .. } => StatusCode::BAD_REQUEST,
        IndexwatchError::Validation { .. } | IndexwatchError::InvalidFileType { .. } => {
            StatusCode::BAD_REQUEST
        }
        IndexwatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        IndexwatchError::UnmatchedFile { .. } | IndexwatchError::Decode { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        IndexwatchError::Database { .. }
        | IndexwatchError::DatabaseQuery { .. }
        | IndexwatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

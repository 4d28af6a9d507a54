use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::content::ExtractionError;
use crate::openai::CompletionError;
use crate::upload::UploadError;

/// Every failure the extraction endpoint can report.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed multipart body: {0}")]
    MalformedBody(String),

    #[error("upload exceeds the size limit: {0}")]
    PayloadTooLarge(String),

    #[error("no file field in request")]
    MissingFile,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("{0}")]
    Internal(String),
}

/// Error body returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Extraction(_) | Self::Completion(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::MalformedBody(_) => "Error processing file",
            Self::PayloadTooLarge(_) => "File too large",
            Self::MissingFile => "No file uploaded",
            Self::MethodNotAllowed => "Method not allowed",
            Self::Extraction(_) => "Error extracting file content",
            Self::Completion(CompletionError::MissingApiKey) => "Server configuration error",
            Self::Completion(
                CompletionError::Refusal(_)
                | CompletionError::EmptyContent
                | CompletionError::InvalidOutput(_),
            ) => "Invalid response from AI service",
            Self::Completion(_) => "Error processing travellers",
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl From<MultipartError> for ApiError {
    /// Reading past the body limit is reported apart from a broken body.
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::MalformedBody(err.body_text())
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Multipart(e) => e.into(),
            UploadError::Io(e) => Self::Internal(format!("failed to store upload: {}", e)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            message: self.message().to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

//! Error types for stemsep-api
//!
//! `JobError` is the taxonomy of fatal job failures. `ApiError` maps them onto
//! HTTP responses.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use stemsep_common::CodecError;
use thiserror::Error;

/// Fatal failure of one separation job
///
/// None of these are retried internally; a retry is a fresh job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected filename or model identifier
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upload or job directory could not be written
    #[error("Failed to write {}: {source}", .path.display())]
    UploadWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Engine executable could not be started
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Engine exited nonzero; `stderr` is its diagnostic stream verbatim
    #[error("Separation failed: {stderr}")]
    Engine { code: Option<i32>, stderr: String },

    /// A stem could not be encoded
    #[error("Stem encoding failed: {0}")]
    Encode(#[from] CodecError),

    /// No result directory, or no stem files in it
    #[error("Could not find separated files under {}", .0.display())]
    ResultsNotFound(PathBuf),

    /// Several candidate result directories and no exact match
    #[error("Ambiguous result directory under {}: {}", .dir.display(), .candidates.join(", "))]
    ResultsAmbiguous {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    /// Job exceeded its deadline; the engine was killed
    #[error("Separation cancelled after exceeding {}s deadline", .0.as_secs())]
    Cancellation(Duration),

    /// I/O error while inspecting results
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            JobError::InvalidInput(_) => "INVALID_INPUT",
            JobError::UploadWrite { .. } => "UPLOAD_WRITE_FAILURE",
            JobError::Launch { .. } => "LAUNCH_FAILURE",
            JobError::Engine { .. } => "ENGINE_FAILURE",
            JobError::Encode(_) => "ENCODE_FAILURE",
            JobError::ResultsNotFound(_) => "RESULTS_NOT_FOUND",
            JobError::ResultsAmbiguous { .. } => "RESULTS_AMBIGUOUS",
            JobError::Cancellation(_) => "CANCELLATION_FAILURE",
            JobError::Io(_) => "IO_ERROR",
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Malformed or oversized multipart body (status taken from the error)
    #[error("Invalid upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    /// Separation job failed
    #[error(transparent)]
    Job(#[from] JobError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Multipart(err) => {
                let status = err.status();
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "UPLOAD_TOO_LARGE"
                } else {
                    "BAD_REQUEST"
                };
                (status, code, err.body_text())
            }
            ApiError::Job(ref err @ JobError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, err.code(), err.to_string())
            }
            ApiError::Job(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string()),
        };

        let body = Json(json!({
            "success": false,
            "detail": message,
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failure_carries_stderr_verbatim() {
        let err = JobError::Engine {
            code: Some(1),
            stderr: "RuntimeError: CUDA out of memory".to_string(),
        };
        assert_eq!(err.to_string(), "Separation failed: RuntimeError: CUDA out of memory");
        assert_eq!(err.code(), "ENGINE_FAILURE");
    }

    #[test]
    fn test_invalid_input_maps_to_bad_request() {
        let response = ApiError::from(JobError::InvalidInput("empty filename".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_job_failures_map_to_server_error() {
        let response = ApiError::from(JobError::ResultsNotFound(PathBuf::from("/out/x/htdemucs")))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

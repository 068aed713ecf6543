use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::llm::chat::LlmError;

/// Problems with what the caller sent us.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Only PCAP files are allowed (got '{0}')")]
    BadExtension(String),
    #[error("File not found: {0}")]
    UnknownCapture(String),
    #[error("Missing multipart field '{0}'")]
    MissingField(&'static str),
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),
    #[error("Message {0} uses the tool role, which callers may not send")]
    CallerToolTurn(usize),
}

/// Failures coming out of the dissector or the worker wrapping it.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{operation} timed out after {}s", .after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    #[error("failed to launch dissector '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dissector rejected the capture: {0}")]
    Dissector(String),
    #[error("dissector output could not be read: {0}")]
    Output(String),
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Reasoning(#[from] LlmError),
    #[error("capture storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

impl AnalyzerError {
    pub fn category(&self) -> &'static str {
        match self {
            AnalyzerError::Validation(_) => "validation_error",
            AnalyzerError::Extraction(_) => "extraction_error",
            AnalyzerError::Reasoning(_) => "reasoning_service_error",
            AnalyzerError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzerError::Validation(ValidationError::UnknownCapture(_)) => StatusCode::NOT_FOUND,
            AnalyzerError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyzerError::Extraction(_) | AnalyzerError::Storage(_) =>
                StatusCode::INTERNAL_SERVER_ERROR,
            AnalyzerError::Reasoning(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    category: &'static str,
    detail: String,
}

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} ({}): {:?}", self.category(), status, self);
        }
        let body = ErrorBody {
            category: self.category(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_capture_maps_to_not_found() {
        let err = AnalyzerError::from(ValidationError::UnknownCapture("deadbeef".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.category(), "validation_error");
        assert_eq!(err.to_string(), "File not found: deadbeef");
    }

    #[test]
    fn timeout_message_names_the_operation() {
        let err = ExtractionError::TimedOut {
            operation: "packet counting",
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "packet counting timed out after 30s");
        assert_eq!(AnalyzerError::from(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

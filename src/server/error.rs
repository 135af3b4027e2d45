//! HTTP error type: maps pipeline failures onto status codes and JSON bodies.
//!
//! Every error body has the shape `{"error": "<message>"}`; failures that
//! happen after a submission was created also carry its `submission_id` so
//! the caller can find the artifacts written before the failure.

use crate::error::{ErrorKind, IntakeError};
use crate::store::SubmissionId;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The multipart body was rejected while streaming (e.g. too large).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// The pipeline failed for an accepted submission.
    #[error("{source}")]
    Pipeline {
        #[source]
        source: IntakeError,
        submission_id: Option<SubmissionId>,
    },
}

impl ApiError {
    pub fn pipeline(source: IntakeError, submission_id: SubmissionId) -> Self {
        ApiError::Pipeline {
            source,
            submission_id: Some(submission_id),
        }
    }

    /// Status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Pipeline { source, .. } => match source.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::RenderEmpty => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::RemoteCallFailed | ErrorKind::ParseFailed => StatusCode::BAD_GATEWAY,
                ErrorKind::Io | ErrorKind::Config | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::MissingFile(message) => ApiError::BadRequest(message),
            IntakeError::InvalidFileType { .. } => ApiError::BadRequest("Invalid file type".into()),
            other => ApiError::Pipeline {
                source: other,
                submission_id: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, submission_id) = match self {
            ApiError::BadRequest(message) | ApiError::Rejected { message, .. } => (message, None),
            ApiError::Pipeline {
                source,
                submission_id,
            } => {
                let message = match source.kind() {
                    ErrorKind::InvalidInput => source.to_string(),
                    ErrorKind::RenderEmpty => {
                        tracing::warn!(error = %source, "no extractable content");
                        "No content could be extracted from the document".to_string()
                    }
                    ErrorKind::RemoteCallFailed => {
                        tracing::warn!(error = %source, "model call failed");
                        "The model service request failed".to_string()
                    }
                    ErrorKind::ParseFailed => {
                        tracing::warn!(error = %source, "model reply unparseable");
                        "The model reply could not be parsed".to_string()
                    }
                    ErrorKind::Io | ErrorKind::Config | ErrorKind::Internal => {
                        tracing::error!(error = %source, "API internal error");
                        "An internal error occurred".to_string()
                    }
                };
                (message, submission_id)
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                submission_id,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JsonParseError;
    use axum::body::to_bytes;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    async fn body(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_file_type_is_flat_400() {
        let err: ApiError = IntakeError::InvalidFileType {
            filename: "malware.exe".into(),
        }
        .into();
        let (status, json) = body(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, json!({"error": "Invalid file type"}));
    }

    #[tokio::test]
    async fn missing_file_keeps_message() {
        let err: ApiError = IntakeError::MissingFile("No file selected".into()).into();
        let (_, json) = body(err).await;
        assert_eq!(json["error"], "No file selected");
    }

    #[tokio::test]
    async fn render_empty_is_422_with_submission() {
        let id = SubmissionId::new();
        let err = ApiError::pipeline(
            IntakeError::RenderEmpty {
                path: PathBuf::from("/srv/uploads/x/blank.pdf"),
            },
            id,
        );
        let (status, json) = body(err).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["submission_id"], id.to_string());
        assert!(!json["error"].as_str().unwrap().contains("/srv"));
    }

    #[tokio::test]
    async fn remote_and_parse_failures_are_502() {
        let remote = ApiError::pipeline(
            IntakeError::RemoteStatus {
                status: 429,
                body: "quota".into(),
            },
            SubmissionId::new(),
        );
        assert_eq!(remote.status(), StatusCode::BAD_GATEWAY);

        let parse = ApiError::pipeline(
            IntakeError::ParseFailed {
                stage: "extraction",
                source: JsonParseError::NoJsonFound {
                    preview: "sorry".into(),
                },
            },
            SubmissionId::new(),
        );
        assert_eq!(parse.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn io_hides_details() {
        let err: ApiError = IntakeError::io(
            "/secret/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        let (status, json) = body(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({"error": "An internal error occurred"}));
    }
}

//! Error types for the edgequake-intake library.
//!
//! Every stage of a submission's pipeline reports failure through
//! [`IntakeError`]. Nothing is retried and nothing already written to disk
//! is rolled back, so an error simply marks the stage at which a submission
//! stopped. [`IntakeError::kind`] collapses the variants into the coarse
//! [`ErrorKind`] taxonomy the HTTP boundary maps onto status codes.
//!
//! Malformed model output has its own type, [`JsonParseError`], because it is
//! produced by the isolated bracket-scanning routine in
//! [`crate::json_extract`] and is useful on its own in tests.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`IntakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller supplied something unusable (no file, bad extension).
    InvalidInput,
    /// The document produced no evidence to send to the model.
    RenderEmpty,
    /// The completion service could not be reached or answered non-2xx.
    RemoteCallFailed,
    /// The model answered, but no JSON object could be recovered.
    ParseFailed,
    /// Reading or writing submission artifacts failed.
    Io,
    /// The configuration or template is unusable.
    Config,
    /// Unexpected internal failure (panicked task etc.).
    Internal,
}

/// All errors returned by the edgequake-intake library.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload carried no file part or an empty filename.
    #[error("{0}")]
    MissingFile(String),

    /// The file extension is not on the allow-list.
    #[error("Invalid file type: '{filename}'")]
    InvalidFileType { filename: String },

    // ── Rendering ─────────────────────────────────────────────────────────
    /// Rendering yielded no pages and the document has no text either.
    #[error("No content could be extracted from '{path}'")]
    RenderEmpty { path: PathBuf },

    // ── Remote calls ──────────────────────────────────────────────────────
    /// The completion endpoint answered with a non-success status.
    #[error("Completion request failed with HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// The completion call failed before a status was received
    /// (connection refused, timeout, provider error).
    #[error("Completion request failed: {message}")]
    RemoteCall { message: String },

    /// The completion reply did not have the expected envelope.
    #[error("Unexpected completion response: {detail}")]
    MalformedResponse { detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Model output ──────────────────────────────────────────────────────
    /// The model reply did not contain a parseable JSON object.
    #[error("{stage} reply could not be parsed: {source}")]
    ParseFailed {
        stage: &'static str,
        #[source]
        source: JsonParseError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a directory or read/write an artifact.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The template file exists but is not valid JSON.
    #[error("Template '{path}' is not valid JSON: {source}")]
    InvalidTemplate {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    /// Collapse this error into its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::MissingFile(_) | IntakeError::InvalidFileType { .. } => {
                ErrorKind::InvalidInput
            }
            IntakeError::RenderEmpty { .. } => ErrorKind::RenderEmpty,
            IntakeError::RemoteStatus { .. }
            | IntakeError::RemoteCall { .. }
            | IntakeError::MalformedResponse { .. }
            | IntakeError::ProviderNotConfigured { .. } => ErrorKind::RemoteCallFailed,
            IntakeError::ParseFailed { .. } => ErrorKind::ParseFailed,
            IntakeError::Io { .. } => ErrorKind::Io,
            IntakeError::InvalidConfig(_) | IntakeError::InvalidTemplate { .. } => {
                ErrorKind::Config
            }
            IntakeError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntakeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a model reply could not be turned into a JSON value.
#[derive(Debug, Error)]
pub enum JsonParseError {
    /// No `{ … }` span exists in the reply.
    #[error("no JSON object found in reply (starts with {preview:?})")]
    NoJsonFound { preview: String },

    /// A span was found but it is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_display() {
        let e = IntakeError::RemoteStatus {
            status: 429,
            body: "slow down".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("slow down"));
        assert_eq!(e.kind(), ErrorKind::RemoteCallFailed);
    }

    #[test]
    fn parse_failed_names_stage() {
        let e = IntakeError::ParseFailed {
            stage: "extraction",
            source: JsonParseError::NoJsonFound {
                preview: "Sorry".into(),
            },
        };
        assert!(e.to_string().starts_with("extraction reply"));
        assert_eq!(e.kind(), ErrorKind::ParseFailed);
    }

    #[test]
    fn input_errors_are_invalid_input() {
        let e = IntakeError::InvalidFileType {
            filename: "malware.exe".into(),
        };
        assert_eq!(e.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            IntakeError::MissingFile("No file selected".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn io_helper_keeps_path() {
        let e = IntakeError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(e.kind(), ErrorKind::Io);
        assert!(e.to_string().contains("/tmp/x"));
    }
}

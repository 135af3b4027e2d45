//! HTTP boundary: an axum router in front of [`Intake`].
//!
//! | Route | Does |
//! |-------|------|
//! | `GET /` | liveness message |
//! | `POST /upload` | store the multipart `file` part under a new submission |
//! | `POST /api/process_doc` | store the file and run the full pipeline |
//!
//! Requests are traced with `tower-http`'s `TraceLayer`; CORS is permissive
//! because the service is meant to sit behind a browser front-end. There is
//! no authentication.

mod error;

pub use error::{ApiError, ErrorBody};

use crate::error::IntakeError;
use crate::intake::Intake;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

/// Build the application router.
pub fn router(intake: Intake) -> Router {
    let body_limit = intake.config().max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/api/process_doc", post(process_doc))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(intake)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(intake: Intake, addr: SocketAddr) -> Result<(), IntakeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IntakeError::Internal(format!("cannot bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(intake))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| IntakeError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn index() -> Json<Value> {
    Json(json!({"message": "You're Connected Successfully."}))
}

async fn upload(
    State(intake): State<Intake>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let (filename, bytes) = read_file_part(multipart).await?;
    let (id, _path) = intake.accept(&filename, &bytes).await?;

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "filename": filename,
        "submission_id": id,
    })))
}

async fn process_doc(
    State(intake): State<Intake>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let (filename, bytes) = read_file_part(multipart).await?;
    let (id, path) = intake.accept(&filename, &bytes).await?;

    let output = intake
        .process(id, &path, &filename)
        .await
        .map_err(|e| ApiError::pipeline(e, id))?;

    Ok(Json(json!({
        "message": "Data Extracted Successfully.",
        "filename": filename,
        "submission_id": id,
        "application_details": output.reconciled,
    })))
}

/// Pull the `file` part out of the request.
///
/// The filename is returned as sent (possibly empty); sanitising happens in
/// the store.
async fn read_file_part(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(String, Vec<u8>), ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::BadRequest("No file part in the request".into()));
    };

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(FILE_FIELD) {
                    continue;
                }
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::Rejected {
                    status: e.status(),
                    message: e.body_text(),
                })?;
                return Ok((filename, bytes.to_vec()));
            }
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError::Rejected {
                    status: e.status(),
                    message: e.body_text(),
                })
            }
        }
    }

    Err(ApiError::BadRequest("No file part in the request".into()))
}

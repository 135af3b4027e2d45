//! Filesystem persistence for submissions.
//!
//! Every artifact a submission produces lives under a directory named after
//! its [`SubmissionId`]:
//!
//! ```text
//! {uploads_root}/{id}/{original_filename}
//! {output_root}/{id}/extracted_data.json
//! {output_root}/{id}/output.json
//! ```
//!
//! JSON artifacts are pretty-printed with 4-space indentation and written
//! atomically (temp file + rename), so a reader never sees a half-written
//! file. Nothing is ever deleted.

use crate::error::IntakeError;
use crate::pipeline::input::sanitize_filename;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// File name of the raw extraction artifact.
pub const EXTRACTED_FILE: &str = "extracted_data.json";

/// File name of the reconciled artifact.
pub const OUTPUT_FILE: &str = "output.json";

/// Opaque identifier of one submission (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reads and writes submission artifacts under two root directories.
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    uploads_root: PathBuf,
    output_root: PathBuf,
}

impl SubmissionStore {
    pub fn new(uploads_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn upload_dir(&self, id: SubmissionId) -> PathBuf {
        self.uploads_root.join(id.to_string())
    }

    pub fn output_dir(&self, id: SubmissionId) -> PathBuf {
        self.output_root.join(id.to_string())
    }

    /// Allocate a fresh submission and its upload directory.
    pub async fn create(&self) -> Result<SubmissionId, IntakeError> {
        let id = SubmissionId::new();
        let dir = self.upload_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IntakeError::io(&dir, e))?;
        debug!("Created submission {}", id);
        Ok(id)
    }

    /// Store the uploaded bytes under a sanitised version of `filename`.
    pub async fn save_upload(
        &self,
        id: SubmissionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, IntakeError> {
        let dir = self.upload_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IntakeError::io(&dir, e))?;

        let path = dir.join(sanitize_filename(filename));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| IntakeError::io(&path, e))?;
        debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    pub async fn write_extracted(
        &self,
        id: SubmissionId,
        value: &Value,
    ) -> Result<PathBuf, IntakeError> {
        self.write_json(id, EXTRACTED_FILE, value).await
    }

    pub async fn write_output(
        &self,
        id: SubmissionId,
        value: &Value,
    ) -> Result<PathBuf, IntakeError> {
        self.write_json(id, OUTPUT_FILE, value).await
    }

    pub async fn read_extracted(&self, id: SubmissionId) -> Result<Value, IntakeError> {
        self.read_json(id, EXTRACTED_FILE).await
    }

    pub async fn read_output(&self, id: SubmissionId) -> Result<Value, IntakeError> {
        self.read_json(id, OUTPUT_FILE).await
    }

    async fn write_json(
        &self,
        id: SubmissionId,
        name: &str,
        value: &Value,
    ) -> Result<PathBuf, IntakeError> {
        let dir = self.output_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IntakeError::io(&dir, e))?;

        let path = dir.join(name);
        let bytes = to_pretty_json(value).map_err(|e| IntakeError::Internal(e.to_string()))?;

        // Atomic write: write to temp, then rename
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| IntakeError::io(&path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| IntakeError::io(&path, e))?;

        debug!("Wrote {}", path.display());
        Ok(path)
    }

    async fn read_json(&self, id: SubmissionId, name: &str) -> Result<Value, IntakeError> {
        let path = self.output_dir(id).join(name);
        read_json_file(&path).await
    }
}

async fn read_json_file(path: &Path) -> Result<Value, IntakeError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IntakeError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        IntakeError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Serialise with 4-space indentation.
pub fn to_pretty_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

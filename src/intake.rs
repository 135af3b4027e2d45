//! The intake orchestrator: one submission from upload to stored result.
//!
//! ```text
//! upload ──▶ evidence ──▶ extraction ──▶ reconciliation ──▶ output.json
//!  (store)    (render)     (model #1)      (model #2)
//! ```
//!
//! [`Intake`] is cheap to clone (everything sits behind `Arc`) and is shared
//! by every HTTP handler. A submission runs as one sequential task; nothing
//! mutable is shared between submissions, and nothing is retried or rolled
//! back: artifacts written before a failure stay on disk.

use crate::backend::{build_backend, CompletionBackend};
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::evidence::{DirectEvidence, EvidenceProvider};
use crate::extractor::InsightExtractor;
use crate::output::{IntakeOutput, IntakeStats, Stage};
use crate::reconciler::TemplateReconciler;
use crate::store::{SubmissionId, SubmissionStore};
use crate::template::Template;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared handle on the configured pipeline.
#[derive(Clone)]
pub struct Intake {
    config: Arc<IntakeConfig>,
    template: Arc<Template>,
    evidence: Arc<dyn EvidenceProvider>,
    store: SubmissionStore,
    extractor: Arc<InsightExtractor>,
    reconciler: Arc<TemplateReconciler>,
}

impl Intake {
    /// Load the template, build the configured backend and the direct
    /// evidence provider.
    ///
    /// # Errors
    /// Template I/O or parse failures, and backend construction failures
    /// (e.g. no API key).
    pub fn new(config: IntakeConfig) -> Result<Self, IntakeError> {
        let template = Template::load(&config.template_path)?;
        let backend = build_backend(&config)?;
        let evidence = Arc::new(DirectEvidence::new(config.dpi, config.max_rendered_pixels));
        info!("Intake ready (backend: {})", backend.name());
        Ok(Self::with_parts(config, template, evidence, backend))
    }

    /// Assemble a pipeline from explicit parts.
    pub fn with_parts(
        config: IntakeConfig,
        template: Template,
        evidence: Arc<dyn EvidenceProvider>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let store = SubmissionStore::new(&config.uploads_root, &config.output_root);
        let template = Arc::new(template);
        let extractor = InsightExtractor::new(Arc::clone(&backend), store.clone(), &config);
        let reconciler =
            TemplateReconciler::new(backend, store.clone(), Arc::clone(&template), &config);
        Self {
            config: Arc::new(config),
            template,
            evidence,
            store,
            extractor: Arc::new(extractor),
            reconciler: Arc::new(reconciler),
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn store(&self) -> &SubmissionStore {
        &self.store
    }

    /// Reject uploads with an empty name or a disallowed extension.
    pub fn check_upload(&self, filename: &str) -> Result<(), IntakeError> {
        if filename.trim().is_empty() {
            return Err(IntakeError::MissingFile("No file selected".into()));
        }
        if !self.config.is_allowed_file(filename) {
            return Err(IntakeError::InvalidFileType {
                filename: filename.to_string(),
            });
        }
        Ok(())
    }

    /// Validate and store an upload under a fresh submission.
    pub async fn accept(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(SubmissionId, PathBuf), IntakeError> {
        self.check_upload(filename)?;
        let id = self.store.create().await?;
        let path = self.store.save_upload(id, filename, bytes).await?;
        info!("Submission {}: stored upload '{}' ({} bytes)", id, filename, bytes.len());
        Ok((id, path))
    }

    /// Run the pipeline for an already stored upload.
    pub async fn process(
        &self,
        id: SubmissionId,
        path: &Path,
        filename: &str,
    ) -> Result<IntakeOutput, IntakeError> {
        self.process_tracked(id, path, filename).await.1
    }

    /// Like [`Intake::process`], also reporting the final stage:
    /// [`Stage::Stored`] on success, [`Stage::Failed`] otherwise.
    pub async fn process_tracked(
        &self,
        id: SubmissionId,
        path: &Path,
        filename: &str,
    ) -> (Stage, Result<IntakeOutput, IntakeError>) {
        let mut stage = Stage::Uploaded;
        let result = self.run(id, path, filename, &mut stage).await;
        if let Err(ref e) = result {
            error!("Submission {} failed after stage '{}': {}", id, stage, e);
            stage = Stage::Failed;
        }
        (stage, result)
    }

    /// Accept an upload and process it in one go.
    pub async fn submit(&self, filename: &str, bytes: &[u8]) -> Result<IntakeOutput, IntakeError> {
        let (id, path) = self.accept(filename, bytes).await?;
        self.process(id, &path, filename).await
    }

    /// Copy a local file into the store and process it.
    pub async fn process_file(&self, path: impl AsRef<Path>) -> Result<IntakeOutput, IntakeError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IntakeError::io(path, e))?;
        self.submit(&filename, &bytes).await
    }

    async fn run(
        &self,
        id: SubmissionId,
        path: &Path,
        filename: &str,
        stage: &mut Stage,
    ) -> Result<IntakeOutput, IntakeError> {
        let total_start = Instant::now();

        // ── Step 1: Gather evidence ──────────────────────────────────────
        let render_start = Instant::now();
        let evidence = self.evidence.gather(path).await;
        if evidence.is_empty() {
            return Err(IntakeError::RenderEmpty {
                path: path.to_path_buf(),
            });
        }
        let pages = evidence.page_count();
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        *stage = Stage::Rendered;
        info!("Submission {}: {} ({} pages)", id, stage, pages);

        // ── Step 2: Extraction call ──────────────────────────────────────
        let extraction = self.extractor.extract(id, evidence).await?;
        *stage = Stage::Extracted;

        // ── Step 3: Reconciliation call + persist ────────────────────────
        let reconciliation = match self.reconciler.reconcile(id, &extraction.value).await {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, IntakeError::Io { .. }) {
                    *stage = Stage::Reconciled;
                }
                return Err(e);
            }
        };
        *stage = Stage::Stored;

        let stats = IntakeStats {
            pages,
            total_input_tokens: (extraction.input_tokens + reconciliation.input_tokens) as u64,
            total_output_tokens: (extraction.output_tokens + reconciliation.output_tokens) as u64,
            render_duration_ms,
            extraction_duration_ms: extraction.duration_ms,
            reconciliation_duration_ms: reconciliation.duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            missing_fields: reconciliation.missing_fields,
        };
        info!(
            "Submission {}: {} in {}ms ({} in / {} out tokens)",
            id, stage, stats.total_duration_ms, stats.total_input_tokens, stats.total_output_tokens
        );

        Ok(IntakeOutput {
            submission_id: id,
            filename: filename.to_string(),
            extracted: extraction.value,
            reconciled: reconciliation.value,
            stats,
        })
    }
}

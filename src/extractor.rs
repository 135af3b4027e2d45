//! The extraction call: evidence in, loosely structured JSON out.
//!
//! One request per submission. The user turn carries the extraction
//! instruction followed by every page image in order (or, for text uploads,
//! the document text quoted after the instruction). The reply is
//! bracket-scanned, parsed and persisted as `extracted_data.json` before it
//! is handed to reconciliation. The JSON is not validated any further.

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::evidence::Evidence;
use crate::json_extract::extract_json_object;
use crate::prompts::{text_evidence_message, EXTRACTION_INSTRUCTION};
use crate::store::{SubmissionId, SubmissionStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Parsed extraction plus accounting.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub value: Value,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

pub struct InsightExtractor {
    backend: Arc<dyn CompletionBackend>,
    store: SubmissionStore,
    instruction: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl InsightExtractor {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: SubmissionStore,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            backend,
            store,
            instruction: config
                .extraction_prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_INSTRUCTION.to_string()),
            model: config.extraction_model.clone(),
            max_tokens: config.extraction_max_tokens,
            temperature: config.extraction_temperature,
        }
    }

    /// Build the extraction request for `evidence`.
    pub fn request(&self, evidence: Evidence) -> CompletionRequest {
        let (user_text, images) = match evidence {
            Evidence::Images(pages) => (self.instruction.clone(), pages),
            Evidence::Text(text) => (text_evidence_message(&self.instruction, &text), Vec::new()),
        };
        CompletionRequest {
            system: None,
            user_text,
            images,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Run the extraction call for submission `id` and persist the result.
    ///
    /// # Errors
    /// Remote failures pass through from the backend; a reply without a
    /// parseable JSON object is [`IntakeError::ParseFailed`]; a failed write
    /// is [`IntakeError::Io`].
    pub async fn extract(
        &self,
        id: SubmissionId,
        evidence: Evidence,
    ) -> Result<Extraction, IntakeError> {
        let start = Instant::now();
        let pages = evidence.page_count();
        let completion = self.backend.complete(self.request(evidence)).await?;

        let value = extract_json_object(&completion.content).map_err(|source| {
            warn!("Submission {}: extraction reply has no usable JSON: {}", id, source);
            IntakeError::ParseFailed {
                stage: "extraction",
                source,
            }
        })?;

        self.store.write_extracted(id, &value).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Submission {}: extracted {} pages in {}ms ({} in / {} out tokens)",
            id, pages, duration_ms, completion.input_tokens, completion.output_tokens
        );

        Ok(Extraction {
            value,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            duration_ms,
        })
    }
}

//! The reconciliation call: map a free-form extraction onto the template.
//!
//! The model sees the template text verbatim in the system prompt and the
//! extraction as pretty JSON in the user turn. Its reply is bracket-scanned
//! and parsed, then the configured [`ShapePolicy`] decides how much the
//! template shape is enforced before the result is written to `output.json`.

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::config::{IntakeConfig, ShapePolicy};
use crate::error::IntakeError;
use crate::json_extract::extract_json_object;
use crate::prompts::{reconciliation_system_prompt, reconciliation_user_message};
use crate::store::{SubmissionId, SubmissionStore};
use crate::template::Template;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Reconciled result plus accounting.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub value: Value,
    /// Template fields the model's reply lacked (before any repair).
    pub missing_fields: Vec<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

pub struct TemplateReconciler {
    backend: Arc<dyn CompletionBackend>,
    store: SubmissionStore,
    template: Arc<Template>,
    policy: ShapePolicy,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl TemplateReconciler {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: SubmissionStore,
        template: Arc<Template>,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            backend,
            store,
            template,
            policy: config.shape_policy,
            model: config.reconciliation_model.clone(),
            max_tokens: config.reconciliation_max_tokens,
            temperature: config.reconciliation_temperature,
        }
    }

    pub fn request(&self, extracted: &Value) -> Result<CompletionRequest, IntakeError> {
        let data = serde_json::to_string_pretty(extracted)
            .map_err(|e| IntakeError::Internal(format!("cannot serialise extraction: {e}")))?;
        Ok(CompletionRequest {
            system: Some(reconciliation_system_prompt(self.template.text())),
            user_text: reconciliation_user_message(&data),
            images: Vec::new(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }

    /// Reconcile `extracted` for submission `id` and persist the result.
    pub async fn reconcile(
        &self,
        id: SubmissionId,
        extracted: &Value,
    ) -> Result<Reconciliation, IntakeError> {
        let start = Instant::now();
        let completion = self.backend.complete(self.request(extracted)?).await?;

        let parsed = extract_json_object(&completion.content).map_err(|source| {
            warn!("Submission {}: reconciliation reply has no usable JSON: {}", id, source);
            IntakeError::ParseFailed {
                stage: "reconciliation",
                source,
            }
        })?;

        let missing_fields = self.template.missing_fields(&parsed);
        let value = match self.policy {
            ShapePolicy::Repair => self.template.conform(&parsed),
            ShapePolicy::Preserve => {
                if !missing_fields.is_empty() {
                    warn!(
                        "Submission {}: reply lacks {} template fields (first: {})",
                        id,
                        missing_fields.len(),
                        missing_fields[0]
                    );
                }
                parsed
            }
        };

        self.store.write_output(id, &value).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Submission {}: reconciled in {}ms ({} missing fields, policy {:?})",
            id,
            duration_ms,
            missing_fields.len(),
            self.policy
        );

        Ok(Reconciliation {
            value,
            missing_fields,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::prompts::RECONCILIATION_PREAMBLE;
    use serde_json::json;

    const TEMPLATE: &str = r#"{
    "insured_name": "<value>",
    "coverage_values": [
        {
            "coverage_parameter_id": "cvg_effective_date",
            "value": "<value>",
            "input_type": "date"
        }
    ]
}"#;

    fn reconciler(
        reply: &str,
        policy: ShapePolicy,
    ) -> (tempfile::TempDir, Arc<ScriptedBackend>, TemplateReconciler) {
        let dir = tempfile::tempdir().unwrap();
        let store = SubmissionStore::new(dir.path().join("uploads"), dir.path().join("output"));
        let backend = Arc::new(ScriptedBackend::replying([reply]));
        let config = IntakeConfig::builder().shape_policy(policy).build().unwrap();
        let template = Arc::new(Template::from_json_str(TEMPLATE).unwrap());
        let r = TemplateReconciler::new(backend.clone(), store, template, &config);
        (dir, backend, r)
    }

    #[tokio::test]
    async fn prompt_embeds_template_and_extraction() {
        let (_dir, backend, r) = reconciler("{}", ShapePolicy::Repair);
        r.reconcile(SubmissionId::new(), &json!({"Insured": "ACME"}))
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        let req = &requests[0];
        let system = req.system.as_deref().unwrap();
        assert!(system.starts_with(RECONCILIATION_PREAMBLE));
        assert!(system.ends_with(TEMPLATE));
        assert!(req.user_text.contains("\"Insured\": \"ACME\""));
        assert!(req.images.is_empty());
        assert_eq!(req.temperature, 0.1);
    }

    #[tokio::test]
    async fn repair_fills_and_drops() {
        let reply = r#"Here you go:
        {"insured_name": "ACME Ltd", "invented": 1,
         "coverage_values": [{"coverage_parameter_id": "cvg_effective_date", "value": "2024-01-01"}]}"#;
        let (dir, _backend, r) = reconciler(reply, ShapePolicy::Repair);
        let id = SubmissionId::new();

        let out = r.reconcile(id, &json!({})).await.unwrap();
        assert_eq!(
            out.value,
            json!({
                "insured_name": "ACME Ltd",
                "coverage_values": [{
                    "coverage_parameter_id": "cvg_effective_date",
                    "value": "2024-01-01",
                    "input_type": "date"
                }]
            })
        );
        assert_eq!(out.missing_fields, ["coverage_values[0].input_type"]);

        let store = SubmissionStore::new(dir.path().join("uploads"), dir.path().join("output"));
        assert_eq!(store.read_output(id).await.unwrap(), out.value);
    }

    #[tokio::test]
    async fn repair_blanks_records_with_unknown_ids() {
        let reply = r#"{"coverage_values": [
            {"coverage_parameter_id": "hallucinated", "value": "2024-01-01"}
        ]}"#;
        let (_dir, _backend, r) = reconciler(reply, ShapePolicy::Repair);
        let out = r.reconcile(SubmissionId::new(), &json!({})).await.unwrap();
        assert_eq!(
            out.value["coverage_values"][0]["coverage_parameter_id"],
            "cvg_effective_date"
        );
        assert_eq!(out.value["coverage_values"][0]["value"], "");
        let mut missing = out.missing_fields;
        missing.sort();
        assert_eq!(missing, ["coverage_values[0]", "insured_name"]);
    }

    #[tokio::test]
    async fn repair_blanks_missing_placeholders() {
        let (_dir, _backend, r) = reconciler("{}", ShapePolicy::Repair);
        let out = r.reconcile(SubmissionId::new(), &json!({})).await.unwrap();
        assert_eq!(out.value["insured_name"], "");
        assert_eq!(out.value["coverage_values"][0]["value"], "");
        assert_eq!(out.value["coverage_values"][0]["input_type"], "date");
    }

    #[tokio::test]
    async fn preserve_returns_reply_verbatim() {
        let (_dir, _backend, r) = reconciler(
            r#"{"insured_name": "ACME", "extra": true}"#,
            ShapePolicy::Preserve,
        );
        let out = r.reconcile(SubmissionId::new(), &json!({})).await.unwrap();
        assert_eq!(out.value, json!({"insured_name": "ACME", "extra": true}));
        assert_eq!(out.missing_fields, ["coverage_values"]);
    }

    #[tokio::test]
    async fn invalid_json_is_parse_failure() {
        let (_dir, _backend, r) = reconciler("{not json}", ShapePolicy::Repair);
        let err = r.reconcile(SubmissionId::new(), &json!({})).await.unwrap_err();
        assert!(matches!(err, IntakeError::ParseFailed { stage: "reconciliation", .. }));
    }
}

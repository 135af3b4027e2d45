//! # edgequake-intake
//!
//! Turn uploaded documents into template-shaped JSON using multimodal
//! language models.
//!
//! A submission is a PDF, an image or a plain-text file. Its pages are
//! rendered to images and shown to a vision model, which extracts everything
//! it can read as free-form JSON. A second call maps that extraction onto a
//! fixed JSON template (the form the data is destined for), and the result is
//! stored on disk under the submission's identifier.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Store      uploads/{id}/{filename}
//!  ├─ 2. Render     PDF pages via pdfium (spawn_blocking); images pass through
//!  ├─ 3. Extract    model call #1: instruction + page images → JSON
//!  │                 → output/{id}/extracted_data.json
//!  ├─ 4. Reconcile  model call #2: template + extraction → template-shaped JSON
//!  │                 → output/{id}/output.json
//!  └─ 5. Respond    HTTP 200 with the reconciled fields
//! ```
//!
//! Model replies are free text; the JSON object is recovered by taking the
//! span from the first `{` to the last `}` ([`json_extract`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_intake::{Intake, IntakeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from OPENAI_API_KEY
//!     let config = IntakeConfig::builder()
//!         .template_path("sample/template/template.json")
//!         .build()?;
//!     let intake = Intake::new(config)?;
//!     let output = intake.process_file("application.pdf").await?;
//!     println!("{}", serde_json::to_string_pretty(&output.reconciled)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `intake` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod evidence;
pub mod extractor;
pub mod intake;
pub mod json_extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod reconciler;
pub mod server;
pub mod store;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    build_backend, ChatCompletionsBackend, Completion, CompletionBackend, CompletionRequest,
    ProviderBackend,
};
pub use config::{BackendKind, IntakeConfig, IntakeConfigBuilder, ShapePolicy};
pub use error::{ErrorKind, IntakeError, JsonParseError};
pub use evidence::{DirectEvidence, Evidence, EvidenceProvider};
pub use intake::Intake;
pub use json_extract::extract_json_object;
pub use output::{IntakeOutput, IntakeStats, Stage};
pub use store::{SubmissionId, SubmissionStore};
pub use template::Template;

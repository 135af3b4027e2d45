//! Configuration types for document intake.
//!
//! Every knob of the pipeline lives in one immutable [`IntakeConfig`], built
//! via [`IntakeConfigBuilder`] and handed to [`crate::intake::Intake`] once at
//! start-up. Nothing in the pipeline reads process-wide state after that:
//! the API key, the template path and the model choices all travel inside
//! this struct, which keeps tests free to swap any of them.

use crate::error::IntakeError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extensions accepted by default (compared case-insensitively).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["txt", "pdf", "png", "jpg", "jpeg", "gif"];

/// Default base URL of the OpenAI-compatible chat-completions API.
pub const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1";

/// Configuration for the intake pipeline.
///
/// Built via [`IntakeConfig::builder()`] or using [`IntakeConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_intake::{IntakeConfig, ShapePolicy};
///
/// let config = IntakeConfig::builder()
///     .dpi(150)
///     .template_path("forms/cyber.json")
///     .shape_policy(ShapePolicy::Preserve)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// Rendering DPI for PDF pages. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    ///
    /// Caps either edge independently of DPI so an oversized page cannot
    /// exhaust memory or blow past the model's upload limit.
    pub max_rendered_pixels: u32,

    /// Model used for the multimodal extraction call. Default: `gpt-4o`.
    pub extraction_model: String,

    /// Model used for the template reconciliation call. Default: `gpt-4o`.
    pub reconciliation_model: String,

    /// Output token limit for the extraction call. Default: 2000.
    pub extraction_max_tokens: usize,

    /// Output token limit for the reconciliation call. Default: 4096.
    pub reconciliation_max_tokens: usize,

    /// Sampling temperature for extraction. Default: 0.0.
    pub extraction_temperature: f32,

    /// Sampling temperature for reconciliation. Default: 0.1.
    pub reconciliation_temperature: f32,

    /// Per-call timeout for completion requests in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Which completion backend talks to the model.
    pub backend: BackendKind,

    /// API key for [`BackendKind::ChatCompletions`].
    /// If None, `OPENAI_API_KEY` is read when the backend is built.
    pub api_key: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over [`BackendKind`].
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom extraction instruction. If None, uses the built-in one.
    pub extraction_prompt: Option<String>,

    /// Path of the template JSON file. Default: `sample/template/template.json`.
    pub template_path: PathBuf,

    /// Root directory for uploaded originals. Default: `uploads`.
    pub uploads_root: PathBuf,

    /// Root directory for extracted and reconciled artifacts. Default: `output`.
    pub output_root: PathBuf,

    /// Lower-cased file extensions accepted at upload time.
    pub allowed_extensions: Vec<String>,

    /// What to do when the reconciled output drifts from the template shape.
    pub shape_policy: ShapePolicy,

    /// Maximum accepted upload size in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 2000,
            extraction_model: "gpt-4o".to_string(),
            reconciliation_model: "gpt-4o".to_string(),
            extraction_max_tokens: 2000,
            reconciliation_max_tokens: 4096,
            extraction_temperature: 0.0,
            reconciliation_temperature: 0.1,
            api_timeout_secs: 120,
            backend: BackendKind::default(),
            api_key: None,
            provider: None,
            extraction_prompt: None,
            template_path: PathBuf::from("sample/template/template.json"),
            uploads_root: PathBuf::from("uploads"),
            output_root: PathBuf::from("output"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shape_policy: ShapePolicy::default(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("extraction_model", &self.extraction_model)
            .field("reconciliation_model", &self.reconciliation_model)
            .field("extraction_max_tokens", &self.extraction_max_tokens)
            .field("reconciliation_max_tokens", &self.reconciliation_max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("template_path", &self.template_path)
            .field("uploads_root", &self.uploads_root)
            .field("output_root", &self.output_root)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("shape_policy", &self.shape_policy)
            .finish()
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `filename` carries an allowed extension.
    ///
    /// The extension is whatever follows the last `.`; a name without a dot
    /// is never allowed.
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            _ => false,
        }
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn reconciliation_model(mut self, model: impl Into<String>) -> Self {
        self.config.reconciliation_model = model.into();
        self
    }

    /// Use the same model for both calls.
    pub fn model(self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.extraction_model(model.clone()).reconciliation_model(model)
    }

    pub fn extraction_max_tokens(mut self, n: usize) -> Self {
        self.config.extraction_max_tokens = n;
        self
    }

    pub fn reconciliation_max_tokens(mut self, n: usize) -> Self {
        self.config.reconciliation_max_tokens = n;
        self
    }

    pub fn extraction_temperature(mut self, t: f32) -> Self {
        self.config.extraction_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn reconciliation_temperature(mut self, t: f32) -> Self {
        self.config.reconciliation_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn template_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.template_path = path.as_ref().to_path_buf();
        self
    }

    pub fn uploads_root(mut self, path: impl AsRef<Path>) -> Self {
        self.config.uploads_root = path.as_ref().to_path_buf();
        self
    }

    pub fn output_root(mut self, path: impl AsRef<Path>) -> Self {
        self.config.output_root = path.as_ref().to_path_buf();
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn shape_policy(mut self, policy: ShapePolicy) -> Self {
        self.config.shape_policy = policy;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(IntakeError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.extraction_model.trim().is_empty() || c.reconciliation_model.trim().is_empty() {
            return Err(IntakeError::InvalidConfig("Model name must not be empty".into()));
        }
        if c.allowed_extensions.is_empty() {
            return Err(IntakeError::InvalidConfig(
                "At least one allowed file extension is required".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(IntakeError::InvalidConfig(
                "Upload size limit must be ≥ 1 byte".into(),
            ));
        }
        if let BackendKind::ChatCompletions { ref base_url } = c.backend {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(IntakeError::InvalidConfig(format!(
                    "Chat-completions base URL must be http(s), got '{base_url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which completion backend carries the two model calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Route through an `edgequake-llm` provider. `name` selects it
    /// (`openai`, `anthropic`, `gemini`, …); None auto-detects from the
    /// environment.
    Provider { name: Option<String> },
    /// Speak the OpenAI `/chat/completions` wire format directly.
    ChatCompletions { base_url: String },
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::ChatCompletions {
            base_url: DEFAULT_CHAT_COMPLETIONS_URL.to_string(),
        }
    }
}

/// How strictly the reconciled result must follow the template's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapePolicy {
    /// Rebuild the result on the template: every template field is present,
    /// unmatched placeholders become `""`, invented keys are dropped. (default)
    #[default]
    Repair,
    /// Return the model's JSON exactly as parsed.
    Preserve,
}

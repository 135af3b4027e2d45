//! Completion backend over an `edgequake-llm` provider.

use super::{Completion, CompletionBackend, CompletionRequest};
use crate::config::{BackendKind, IntakeConfig};
use crate::error::IntakeError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends completion requests through `edgequake-llm`.
///
/// `edgequake-llm` binds the model when the provider is created, so one
/// provider is resolved per configured model name. Requests for a model with
/// no dedicated provider go to the default one.
pub struct ProviderBackend {
    by_model: HashMap<String, Arc<dyn LLMProvider>>,
    default: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl ProviderBackend {
    /// Wrap a single provider used for every model.
    pub fn new(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self {
            by_model: HashMap::new(),
            default: provider,
            timeout,
        }
    }

    /// Resolve providers for the extraction and reconciliation models.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let timeout = Duration::from_secs(config.api_timeout_secs);

        if let Some(ref provider) = config.provider {
            return Ok(Self::new(Arc::clone(provider), timeout));
        }

        let name = match config.backend {
            BackendKind::Provider { ref name } => name.as_deref(),
            BackendKind::ChatCompletions { .. } => None,
        };

        let default = resolve_provider(name, &config.extraction_model)?;
        let mut by_model = HashMap::new();
        by_model.insert(config.extraction_model.clone(), Arc::clone(&default));
        if config.reconciliation_model != config.extraction_model {
            by_model.insert(
                config.reconciliation_model.clone(),
                resolve_provider(name, &config.reconciliation_model)?,
            );
        }

        Ok(Self {
            by_model,
            default,
            timeout,
        })
    }

    fn provider_for(&self, model: &str) -> &Arc<dyn LLMProvider> {
        self.by_model.get(model).unwrap_or(&self.default)
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, IntakeError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user_with_images(
            request.user_text.as_str(),
            request.images,
        ));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let provider = self.provider_for(&request.model);
        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| IntakeError::RemoteCall {
                message: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| IntakeError::RemoteCall {
                message: format!("{}", e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.model, response.prompt_tokens, response.completion_tokens
        );

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }

    fn name(&self) -> &str {
        "edgequake-llm"
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IntakeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IntakeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve a provider for `model`, from most-specific to least-specific:
///
/// 1. an explicit provider name;
/// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 3. `OPENAI_API_KEY`, which selects OpenAI even when other keys exist;
/// 4. whatever `ProviderFactory::from_env` detects.
fn resolve_provider(name: Option<&str>, model: &str) -> Result<Arc<dyn LLMProvider>, IntakeError> {
    if let Some(name) = name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IntakeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

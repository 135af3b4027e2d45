//! Completion backends: one chat-completion call, two ways of making it.
//!
//! Both model calls of the pipeline (extraction and reconciliation) go
//! through the [`CompletionBackend`] trait, so the orchestrator never knows
//! which wire format is in use and tests can substitute a scripted fake.
//!
//! | Backend | Transport | Selected by |
//! |---------|-----------|-------------|
//! | [`ProviderBackend`] | `edgequake-llm` provider (OpenAI, Anthropic, Gemini, …) | [`BackendKind::Provider`] or a pre-built provider |
//! | [`ChatCompletionsBackend`] | raw `POST {base_url}/chat/completions` | [`BackendKind::ChatCompletions`] (default) |
//!
//! Neither backend retries. A per-call timeout (`api_timeout_secs`) bounds
//! every request.

mod chat_completions;
mod provider;

pub use chat_completions::ChatCompletionsBackend;
pub use provider::ProviderBackend;

use crate::config::{BackendKind, IntakeConfig};
use crate::error::IntakeError;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use std::sync::Arc;

/// One chat-completion request.
///
/// The user turn is `user_text` followed by `images` in order.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user_text: String,
    pub images: Vec<ImageData>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// The model's reply and its token accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Performs a single chat-completion call.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, IntakeError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Build the backend selected by `config`.
///
/// A pre-built provider in [`IntakeConfig::provider`] always wins.
pub fn build_backend(config: &IntakeConfig) -> Result<Arc<dyn CompletionBackend>, IntakeError> {
    if config.provider.is_some() {
        return Ok(Arc::new(ProviderBackend::from_config(config)?));
    }
    match config.backend {
        BackendKind::Provider { .. } => Ok(Arc::new(ProviderBackend::from_config(config)?)),
        BackendKind::ChatCompletions { .. } => {
            Ok(Arc::new(ChatCompletionsBackend::from_config(config)?))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, IntakeError>>>,
        pub(crate) requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn replying<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(err: IntakeError) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(err)])),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, IntakeError> {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(IntakeError::Internal("script exhausted".into())))?;
            Ok(Completion {
                content: reply,
                input_tokens: 10,
                output_tokens: 5,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}

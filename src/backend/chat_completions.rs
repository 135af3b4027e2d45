//! Completion backend speaking the OpenAI `/chat/completions` wire format.
//!
//! Any OpenAI-compatible endpoint works (OpenAI itself, Azure behind a
//! gateway, vLLM, LiteLLM). The user turn is a content list: one `text`
//! block, then one `image_url` block per page carrying a `data:` URI.

use super::{Completion, CompletionBackend, CompletionRequest};
use crate::config::{BackendKind, IntakeConfig, DEFAULT_CHAT_COMPLETIONS_URL};
use crate::error::IntakeError;
use crate::pipeline::encode::data_uri;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest error body kept in [`IntakeError::RemoteStatus`].
const MAX_ERROR_BODY_CHARS: usize = 1000;

pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl ChatCompletionsBackend {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IntakeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntakeError::Internal(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            client,
            url: chat_url(base_url),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build from config; the key comes from `api_key` or `OPENAI_API_KEY`.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let base_url = match config.backend {
            BackendKind::ChatCompletions { ref base_url } => base_url.as_str(),
            BackendKind::Provider { .. } => DEFAULT_CHAT_COMPLETIONS_URL,
        };

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| IntakeError::ProviderNotConfigured {
                provider: "chat-completions".to_string(),
                hint: "Set OPENAI_API_KEY or pass --api-key.".to_string(),
            })?;

        Self::new(base_url, api_key, Duration::from_secs(config.api_timeout_secs))
    }

    /// Full endpoint URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, IntakeError> {
        let body = ChatRequest::from_request(&request);
        debug!(
            "POST {} (model {}, {} images)",
            self.url,
            request.model,
            request.images.len()
        );

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IntakeError::RemoteCall {
                message: if e.is_timeout() {
                    format!("timed out after {}s", self.timeout.as_secs())
                } else {
                    e.to_string()
                },
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| IntakeError::RemoteCall {
            message: format!("Error reading response body: {e}"),
        })?;

        if !status.is_success() {
            warn!("Completion endpoint answered HTTP {}", status.as_u16());
            return Err(IntakeError::RemoteStatus {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        parse_response(&text)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum RequestMessage<'a> {
    System { content: &'a str },
    User { content: Vec<ContentBlock<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl<'a> ChatRequest<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(RequestMessage::System { content: system });
        }

        let mut content = Vec::with_capacity(request.images.len() + 1);
        content.push(ContentBlock::Text {
            text: &request.user_text,
        });
        content.extend(request.images.iter().map(|img| ContentBlock::ImageUrl {
            image_url: ImageUrl { url: data_uri(img) },
        }));
        messages.push(RequestMessage::User { content });

        ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Pull `choices[0].message.content` and usage out of a success body.
fn parse_response(body: &str) -> Result<Completion, IntakeError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| IntakeError::MalformedResponse {
            detail: format!("Error parsing response: {e}"),
        })?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| IntakeError::MalformedResponse {
            detail: "response has no choices".to_string(),
        })?
        .message
        .content
        .ok_or_else(|| IntakeError::MalformedResponse {
            detail: "first choice has no content".to_string(),
        })?;

    let (input_tokens, output_tokens) = response
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(Completion {
        content,
        input_tokens,
        output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use edgequake_llm::ImageData;
    use serde_json::{json, Value};

    fn request(images: Vec<ImageData>) -> CompletionRequest {
        CompletionRequest {
            system: Some("be precise".into()),
            user_text: "Extract all information".into(),
            images,
            model: "gpt-4o".into(),
            max_tokens: 2000,
            temperature: 0.0,
        }
    }

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            chat_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(chat_url("http://localhost:8000"), "http://localhost:8000/chat/completions");
    }

    #[test]
    fn payload_puts_text_before_images() {
        let req = request(vec![
            ImageData::new("AAA".to_string(), "image/png"),
            ImageData::new("BBB".to_string(), "image/png"),
        ]);
        let payload = serde_json::to_value(ChatRequest::from_request(&req)).unwrap();

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["max_tokens"], 2000);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "be precise");

        let user = &payload["messages"][1];
        assert_eq!(user["role"], "user");
        let blocks = user["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], json!({"type": "text", "text": "Extract all information"}));
        assert_eq!(blocks[1]["type"], "image_url");
        assert_eq!(blocks[1]["image_url"]["url"], "data:image/png;base64,AAA");
        assert_eq!(blocks[2]["image_url"]["url"], "data:image/png;base64,BBB");
    }

    #[test]
    fn payload_without_system_has_single_message() {
        let mut req = request(vec![]);
        req.system = None;
        let payload = serde_json::to_value(ChatRequest::from_request(&req)).unwrap();
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 12, "total_tokens": 912}
        }"#;
        let c = parse_response(body).unwrap();
        assert_eq!(c.content, "{\"a\": 1}");
        assert_eq!((c.input_tokens, c.output_tokens), (900, 12));
    }

    #[test]
    fn missing_usage_counts_zero() {
        let c = parse_response(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(c.input_tokens, 0);
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, IntakeError::MalformedResponse { .. }));
        let err = parse_response("<html>").unwrap_err();
        assert!(matches!(err, IntakeError::MalformedResponse { .. }));
    }

    #[test]
    fn missing_key_is_reported() {
        let config = IntakeConfig::builder()
            .api_key("")
            .backend(BackendKind::ChatCompletions {
                base_url: "http://127.0.0.1:9".into(),
            })
            .build()
            .unwrap();
        // An empty explicit key only falls back to the environment.
        if std::env::var("OPENAI_API_KEY").map(|k| k.is_empty()).unwrap_or(true) {
            assert!(matches!(
                ChatCompletionsBackend::from_config(&config),
                Err(IntakeError::ProviderNotConfigured { .. })
            ));
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn round_trip_against_local_endpoint() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let images = body["messages"][1]["content"].as_array().map_or(0, |a| a.len() - 1);
                Json(json!({
                    "choices": [{"message": {"content": format!("{{\"auth\": \"{auth}\", \"images\": {images}}}")}}],
                    "usage": {"prompt_tokens": 5, "completion_tokens": 7}
                }))
            }),
        );
        let base = spawn(app).await;

        let backend =
            ChatCompletionsBackend::new(&base, "sk-test", Duration::from_secs(5)).unwrap();
        let reply = backend
            .complete(request(vec![ImageData::new("AAA".to_string(), "image/png")]))
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&reply.content).unwrap();
        assert_eq!(parsed["auth"], "Bearer sk-test");
        assert_eq!(parsed["images"], 1);
        assert_eq!(reply.output_tokens, 7);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_body() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let base = spawn(app).await;

        let backend = ChatCompletionsBackend::new(&base, "sk-bad", Duration::from_secs(5)).unwrap();
        let err = backend.complete(request(vec![])).await.unwrap_err();
        match err {
            IntakeError::RemoteStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
    }
}

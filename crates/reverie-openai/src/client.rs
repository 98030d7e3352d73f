// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible chat completion and embeddings APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use reverie_core::ReverieError;
use reverie_core::traits::adapter::PluginAdapter;
use reverie_core::traits::{CompletionAdapter, EmbeddingAdapter};
use reverie_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, ProviderRequest, ProviderResponse,
    TokenUsage,
};
use reverie_config::model::LlmConfig;

use crate::types::{
    ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse, EmbeddingsRequest,
    EmbeddingsResponse, WireMessage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI API client implementing the completion and embedding adapter traits.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    embedding_model: String,
    embedding_dimensions: u32,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiProvider {
    /// Creates a provider from the LLM section of the config.
    ///
    /// `embedding_model` is the model used for the `/v1/embeddings` fallback
    /// path, not the chat model. `embedding_dim` is requested from the API
    /// so fallback vectors match the locally embedded ones.
    pub fn new(
        config: &LlmConfig,
        embedding_model: &str,
        embedding_dim: usize,
    ) -> Result<Self, ReverieError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ReverieError::Config("llm.api_key is required for openai".into()))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ReverieError::Config(format!("invalid llm.api_key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ReverieError::Internal(format!("failed to build HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            embedding_model: embedding_model.to_string(),
            embedding_dimensions: embedding_dim as u32,
            timeout,
            max_retries: 1,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// POSTs a JSON body, retrying once on transient failures.
    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ReverieError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_status = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, %url, "retrying request");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| self.map_transport_error(e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if !is_transient_status(status) || attempt == self.max_retries {
                let message = read_api_error(response).await;
                return Err(ReverieError::GenerationFailed {
                    message: format!("request to {path} failed with {status}: {message}"),
                    source: None,
                });
            }
            warn!(%status, attempt, "transient API error, will retry");
            last_status = Some(status);
        }

        // The loop always returns; this is unreachable but keeps the
        // compiler satisfied without a panic.
        Err(ReverieError::GenerationFailed {
            message: format!(
                "request to {path} exhausted retries (last status: {:?})",
                last_status
            ),
            source: None,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ReverieError {
        if e.is_timeout() {
            ReverieError::Timeout {
                duration: self.timeout,
            }
        } else {
            ReverieError::GenerationFailed {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

/// Status codes worth a single retry.
fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

/// Extracts a human-readable message from an error response body.
async fn read_api_error(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(parsed) => parsed.error.message,
            Err(_) => body,
        },
        Err(e) => format!("(failed to read error body: {e})"),
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError> {
        let body = ChatCompletionRequest {
            model: request.model,
            messages: request
                .messages
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self.post_json("/v1/chat/completions", &body).await?;
        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| ReverieError::GenerationFailed {
                message: format!("failed to parse chat completion response: {e}"),
                source: Some(Box::new(e)),
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReverieError::GenerationFailed {
                message: "chat completion response contained no choices".into(),
                source: None,
            })?;

        Ok(ProviderResponse {
            text: choice.message.content,
            model: Some(parsed.model),
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiProvider {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        let body = EmbeddingsRequest {
            model: self.embedding_model.clone(),
            input: input.texts,
            dimensions: Some(self.embedding_dimensions),
        };

        let response = self
            .post_json("/v1/embeddings", &body)
            .await
            .map_err(generation_to_embedding)?;
        let parsed: EmbeddingsResponse =
            response
                .json()
                .await
                .map_err(|e| ReverieError::EmbeddingUnavailable {
                    message: format!("failed to parse embeddings response: {e}"),
                    source: Some(Box::new(e)),
                })?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let dimensions = data.first().map(|d| d.embedding.len()).unwrap_or(0);

        Ok(EmbeddingOutput {
            vectors: data.into_iter().map(|d| d.embedding).collect(),
            dimensions,
        })
    }
}

/// The shared request path reports failures as generation errors; on the
/// embeddings route they must surface as embedding unavailability instead.
fn generation_to_embedding(err: ReverieError) -> ReverieError {
    match err {
        ReverieError::GenerationFailed { message, source } => {
            ReverieError::EmbeddingUnavailable { message, source }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: Some("sk-test".into()),
            base_url: None,
            timeout_secs: 5,
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    fn chat_request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: Some(256),
            temperature: Some(0.7),
        }
    }

    fn chat_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        })
    }

    #[tokio::test]
    async fn completes_a_chat_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let response = provider.complete(chat_request()).await.unwrap();

        assert_eq!(response.text, "hi there");
        assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 4);
    }

    #[tokio::test]
    async fn retries_once_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limited", "type": "rate_limit_error"}
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("after retry")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let response = provider.complete(chat_request()).await.unwrap();
        assert_eq!(response.text, "after retry");
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Unknown model", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let err = provider.complete(chat_request()).await.unwrap_err();
        match err {
            ReverieError::GenerationFailed { message, .. } => {
                assert!(message.contains("Unknown model"), "got: {message}");
            }
            other => panic!("expected GenerationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let err = provider.complete(chat_request()).await.unwrap_err();
        assert!(matches!(err, ReverieError::GenerationFailed { .. }));
    }

    #[tokio::test]
    async fn embeds_and_preserves_input_order() {
        let server = MockServer::start().await;
        // Out-of-order data entries must be re-sorted by index. The request
        // must ask the API for the configured dimension.
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(serde_json::json!({"dimensions": 384})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let output = provider
            .embed(EmbeddingInput {
                texts: vec!["first".into(), "second".into()],
            })
            .await
            .unwrap();

        assert_eq!(output.dimensions, 2);
        assert_eq!(output.vectors[0], vec![1.0, 0.0]);
        assert_eq!(output.vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn embedding_failures_surface_as_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid API key", "type": "authentication_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&test_config(), "text-embedding-3-small", 384)
            .unwrap()
            .with_base_url(&server.uri());
        let err = provider
            .embed(EmbeddingInput::single("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReverieError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let mut config = test_config();
        config.api_key = None;
        let err = OpenAiProvider::new(&config, "text-embedding-3-small", 384).unwrap_err();
        assert!(matches!(err, ReverieError::Config(_)));
    }
}

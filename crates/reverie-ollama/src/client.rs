// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
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
    ApiErrorResponse, ChatOptions, ChatRequest, ChatResponse, EmbeddingsRequest,
    EmbeddingsResponse, WireMessage,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama client implementing the completion and embedding adapter traits.
///
/// No authentication; the server is assumed to be local or on a trusted
/// network.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    embedding_model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaProvider {
    /// Creates a provider from the LLM section of the config.
    pub fn new(config: &LlmConfig, embedding_model: &str) -> Result<Self, ReverieError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
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
            timeout,
            max_retries: 1,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ReverieError> {
        let url = format!("{}{path}", self.base_url);

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
            warn!(%status, attempt, "transient server error, will retry");
        }

        Err(ReverieError::GenerationFailed {
            message: format!("request to {path} exhausted retries"),
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

fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

async fn read_api_error(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) => body,
        },
        Err(e) => format!("(failed to read error body: {e})"),
    }
}

#[async_trait]
impl PluginAdapter for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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
impl CompletionAdapter for OllamaProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError> {
        let options = if request.max_tokens.is_some() || request.temperature.is_some() {
            Some(ChatOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            })
        } else {
            None
        };

        let body = ChatRequest {
            model: request.model,
            messages: request
                .messages
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content,
                })
                .collect(),
            stream: false,
            options,
        };

        let response = self.post_json("/api/chat", &body).await?;
        let parsed: ChatResponse =
            response.json().await.map_err(|e| ReverieError::GenerationFailed {
                message: format!("failed to parse chat response: {e}"),
                source: Some(Box::new(e)),
            })?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(input), Some(output)) => Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        };

        Ok(ProviderResponse {
            text: parsed.message.content,
            model: Some(parsed.model),
            usage,
        })
    }
}

#[async_trait]
impl EmbeddingAdapter for OllamaProvider {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        // The embeddings endpoint takes one prompt at a time.
        let mut vectors = Vec::with_capacity(input.texts.len());
        for text in input.texts {
            let body = EmbeddingsRequest {
                model: self.embedding_model.clone(),
                prompt: text,
            };
            let response = self
                .post_json("/api/embeddings", &body)
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
            vectors.push(parsed.embedding);
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        Ok(EmbeddingOutput {
            vectors,
            dimensions,
        })
    }
}

fn generation_to_embedding(err: ReverieError) -> ReverieError {
    match err {
        ReverieError::GenerationFailed { message, source } => {
            ReverieError::EmbeddingUnavailable { message, source }
        }
        other => other,
    }
}

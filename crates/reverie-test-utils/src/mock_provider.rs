// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `CompletionAdapter` with pre-configured replies
//! and injectable failures, enabling fast, CI-runnable tests without
//! external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use reverie_core::traits::adapter::PluginAdapter;
use reverie_core::traits::provider::CompletionAdapter;
use reverie_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use reverie_core::ReverieError;

enum Scripted {
    Text(String),
    Failure(String),
}

/// A mock LLM provider that returns scripted replies.
///
/// Replies are popped from a FIFO queue; a scripted failure entry makes the
/// corresponding call return `GenerationFailed`. When the queue is empty,
/// a default "mock response" text is returned. Every request is recorded
/// for later inspection.
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty script.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given reply texts.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let provider = Self::new();
        {
            let script = provider.script.clone();
            let mut queue = script.try_lock().expect("fresh mutex");
            for text in responses {
                queue.push_back(Scripted::Text(text));
            }
        }
        provider
    }

    /// Queue a successful reply.
    pub async fn push_response(&self, text: impl Into<String>) {
        self.script.lock().await.push_back(Scripted::Text(text.into()));
    }

    /// Queue a failure; the corresponding call returns `GenerationFailed`.
    pub async fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .await
            .push_back(Scripted::Failure(message.into()));
    }

    /// All requests seen so far, in call order.
    pub async fn recorded_requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of completion calls made.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
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
impl CompletionAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError> {
        self.requests.lock().await.push(request.clone());

        let next = self.script.lock().await.pop_front();
        match next {
            Some(Scripted::Failure(message)) => Err(ReverieError::GenerationFailed {
                message,
                source: None,
            }),
            Some(Scripted::Text(text)) => Ok(ProviderResponse {
                text,
                model: Some(request.model),
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                }),
            }),
            None => Ok(ProviderResponse {
                text: "mock response".to_string(),
                model: Some(request.model),
                usage: None,
            }),
        }
    }
}

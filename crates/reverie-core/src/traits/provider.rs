// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for LLM provider integrations (OpenAI, Ollama).

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for chat-completion LLM backends.
///
/// Implementations own transport concerns entirely: timeouts, retries, and
/// HTTP status handling never leak past this boundary. Any failure surfaces
/// as [`ReverieError::GenerationFailed`] or [`ReverieError::Timeout`].
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError>;
}

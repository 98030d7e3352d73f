// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Reverie agent.

use thiserror::Error;

/// The primary error type used across all Reverie adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ReverieError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// A memory store write did not reach durable storage.
    #[error("store write failed: {source}")]
    StoreWrite {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The referenced memory record does not exist.
    #[error("memory {id} not found")]
    NotFound { id: i64 },

    /// No embedding backend could produce a vector (local model and fallback both failed).
    #[error("embedding unavailable: {message}")]
    EmbeddingUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The language model backend failed to produce text.
    #[error("generation failed: {message}")]
    GenerationFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReverieError {
    /// True when the error means a backend was unreachable or slow, as opposed
    /// to a caller mistake. Callers that fail open branch on this.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ReverieError::EmbeddingUnavailable { .. }
                | ReverieError::GenerationFailed { .. }
                | ReverieError::Timeout { .. }
        )
    }
}

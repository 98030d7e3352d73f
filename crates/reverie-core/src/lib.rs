// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Reverie agent.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Reverie workspace. Provider and embedding
//! backends implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ReverieError;
pub use types::{
    AdapterType, ChatMessage, ChatRole, EmbeddingInput, EmbeddingOutput, HealthStatus,
    ProviderRequest, ProviderResponse, TokenUsage,
};

// Re-export all adapter traits at crate root.
pub use traits::{CompletionAdapter, EmbeddingAdapter, PluginAdapter};

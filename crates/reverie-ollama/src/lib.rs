// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama adapter crate.
//!
//! Implements the completion and embedding adapter traits against a local
//! Ollama server's `/api/chat` and `/api/embeddings` endpoints.

mod client;
mod types;

pub use client::OllamaProvider;

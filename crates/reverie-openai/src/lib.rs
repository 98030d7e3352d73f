// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI adapter crate.
//!
//! Implements the completion and embedding adapter traits against the
//! OpenAI chat completions and embeddings endpoints. Any server speaking
//! the same wire protocol works by overriding `llm.base_url`.

mod client;
mod types;

pub use client::OpenAiProvider;

// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Reverie integration tests.
//!
//! Provides deterministic in-process stand-ins for the LLM provider and the
//! embedding backends, so the agent pipeline can be tested without network
//! access or model files.

pub mod mock_embedder;
pub mod mock_provider;

pub use mock_embedder::{FailingEmbedder, HashEmbedder};
pub use mock_provider::MockProvider;

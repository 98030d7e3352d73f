// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for the Reverie agent.
//!
//! Stores every conversation turn and reflection as an embedded record in
//! SQLite and retrieves the nearest ones by cosine similarity. Embedding is
//! local-first (ONNX all-MiniLM-L6-v2) with a provider fallback; when both
//! are down, writes still land and retrieval degrades to empty.

pub mod embedder;
pub mod model_manager;
pub mod retriever;
pub mod service;
pub mod store;
pub mod types;

pub use embedder::{EMBEDDING_DIM, LocalEmbedder};
pub use model_manager::{ModelManager, ModelPaths};
pub use retriever::Retriever;
pub use service::EmbeddingService;
pub use store::MemoryStore;
pub use types::{MemoryRecord, MemoryRole, ScoredMemory};

// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the long-term memory system.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    /// A user turn, verbatim.
    User,
    /// The agent's delivered reply.
    Assistant,
    /// A self-review summary attached to an assistant reply.
    Reflection,
}

impl MemoryRole {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::Reflection => "reflection",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "user" => MemoryRole::User,
            "reflection" => MemoryRole::Reflection,
            _ => MemoryRole::Assistant,
        }
    }
}

/// A single record in the long-term memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Row id. Assigned by SQLite on insert, never reused.
    pub id: i64,
    /// Who produced this record.
    pub role: MemoryRole,
    /// The stored text.
    pub content: String,
    /// Flat JSON object of scalars: back-references, stale flags, tags.
    pub metadata: Map<String, Value>,
    /// Embedding vector, `None` when no backend was reachable at write time.
    /// Records without an embedding are invisible to similarity search.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

impl MemoryRecord {
    /// Read a boolean metadata flag, treating absence as false.
    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Read an integer metadata field (record back-references).
    pub fn metadata_id(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }
}

/// A memory with its cosine similarity against a query.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The memory record.
    pub memory: MemoryRecord,
    /// Cosine similarity in [-1.0, 1.0]; higher is closer.
    pub score: f32,
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// For L2-normalized vectors (as produced by every embedder in this
/// workspace) this is equivalent to the dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

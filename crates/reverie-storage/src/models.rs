// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row models for the persistence layer.

use serde::{Deserialize, Serialize};

/// A persisted persona identity.
///
/// Timestamps are ISO-8601 UTC strings with millisecond precision, so
/// lexicographic order matches chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    /// Unique persona name; upserts key on this.
    pub name: String,
    pub description: String,
    /// JSON array of standing goal strings.
    pub goals: String,
    /// Whether this persona's seed memories have been written.
    pub seeded: bool,
    pub created_at: String,
    pub updated_at: String,
}

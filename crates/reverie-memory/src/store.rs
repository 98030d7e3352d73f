// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with vector BLOB storage.
//!
//! Every write goes through the single background connection thread, so
//! concurrent callers serialize per row without extra locking. Embedding
//! happens synchronously inside `insert` and `update`: once either returns,
//! the row's stored vector (or its absence) matches its content.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use reverie_core::ReverieError;
use reverie_storage::{Database, map_tr_err};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::service::EmbeddingService;
use crate::types::{
    MemoryRecord, MemoryRole, ScoredMemory, blob_to_vec, cosine_similarity, vec_to_blob,
};

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Persistent store for memory records.
///
/// Embeddings are stored as little-endian f32 BLOBs. Rows with a NULL
/// embedding (written while every embedding backend was down) persist
/// normally but are invisible to [`MemoryStore::query_nearest`].
pub struct MemoryStore {
    db: Database,
    embeddings: Arc<EmbeddingService>,
}

impl MemoryStore {
    /// Creates a store over an open database and an embedding service.
    pub fn new(db: Database, embeddings: Arc<EmbeddingService>) -> Self {
        Self { db, embeddings }
    }

    /// Embed `content`, degrading to `None` when no backend is reachable.
    /// A missing vector never blocks the write.
    async fn try_embed(&self, content: &str) -> Option<Vec<f32>> {
        match self.embeddings.embed(content).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "storing record without embedding");
                None
            }
        }
    }

    /// Insert a new record and return it with its assigned id.
    pub async fn insert(
        &self,
        role: MemoryRole,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<MemoryRecord, ReverieError> {
        let embedding = self.try_embed(content).await;

        let now = now_iso();
        let record = MemoryRecord {
            id: 0,
            role,
            content: content.to_string(),
            metadata,
            embedding,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = record.clone();
        let id = self
            .db
            .connection()
            .call(move |conn| {
                let metadata_json = serde_json::to_string(&row.metadata)
                    .unwrap_or_else(|_| "{}".to_string());
                let blob = row.embedding.as_deref().map(vec_to_blob);
                conn.execute(
                    "INSERT INTO memories (role, content, metadata, embedding, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        row.role.as_str(),
                        row.content,
                        metadata_json,
                        blob,
                        row.created_at,
                        row.updated_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(memory_id = id, role = role.as_str(), "memory inserted");
        Ok(MemoryRecord { id, ..record })
    }

    /// Get a record by id.
    pub async fn get(&self, id: i64) -> Result<Option<MemoryRecord>, ReverieError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, role, content, metadata, embedding, created_at, updated_at
                     FROM memories WHERE id = ?1",
                )?;
                match stmt.query_row(rusqlite::params![id], |row| Ok(row_to_record(row))) {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Replace a record's content, re-embedding before acknowledging.
    ///
    /// Returns [`ReverieError::NotFound`] when `id` does not exist. The
    /// record keeps its id, role, metadata, and `created_at`; only content,
    /// embedding, and `updated_at` change. If re-embedding fails the vector
    /// is cleared rather than left stale, so similarity search never pairs
    /// the new content with the old vector.
    pub async fn update(&self, id: i64, content: &str) -> Result<MemoryRecord, ReverieError> {
        let existing = self.get(id).await?.ok_or(ReverieError::NotFound { id })?;

        let embedding = self.try_embed(content).await;
        let now = now_iso();

        let content_owned = content.to_string();
        let blob = embedding.as_deref().map(vec_to_blob);
        let updated_at = now.clone();
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE memories SET content = ?2, embedding = ?3, updated_at = ?4 WHERE id = ?1",
                    rusqlite::params![id, content_owned, blob, updated_at],
                )?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)?;
        // A delete racing between the read above and this write leaves
        // nothing to update; the affected-row count catches it.
        if changed == 0 {
            return Err(ReverieError::NotFound { id });
        }

        debug!(memory_id = id, "memory updated");
        Ok(MemoryRecord {
            content: content.to_string(),
            embedding,
            updated_at: now,
            ..existing
        })
    }

    /// Delete a record. Deleting an absent id is a no-op.
    pub async fn delete(&self, id: i64) -> Result<(), ReverieError> {
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                let n = conn.execute("DELETE FROM memories WHERE id = ?1", rusqlite::params![id])?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(memory_id = id, deleted = changed > 0, "memory delete");
        Ok(())
    }

    /// Nearest-neighbor scan over every embedded record.
    ///
    /// Results are ordered by cosine similarity descending; equal scores
    /// order newest `created_at` first, then highest id. At most `k`
    /// results. Rows whose vector length does not match the query (mixed
    /// backend dimensions) are skipped.
    pub async fn query_nearest(
        &self,
        query: &[f32],
        k: usize,
        role: Option<MemoryRole>,
    ) -> Result<Vec<ScoredMemory>, ReverieError> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.load_embedded(role).await?;

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let vector = memory.embedding.as_deref()?;
                if vector.len() != query.len() {
                    debug!(
                        memory_id = memory.id,
                        stored = vector.len(),
                        query = query.len(),
                        "skipping record with mismatched embedding dimensions"
                    );
                    return None;
                }
                let score = cosine_similarity(query, vector);
                Some(ScoredMemory { memory, score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
                .then_with(|| b.memory.id.cmp(&a.memory.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Most recent records first, optionally filtered by role.
    pub async fn list_recent(
        &self,
        n: usize,
        role: Option<MemoryRole>,
    ) -> Result<Vec<MemoryRecord>, ReverieError> {
        self.db
            .connection()
            .call(move |conn| {
                let records = match role {
                    Some(role) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, role, content, metadata, embedding, created_at, updated_at
                             FROM memories WHERE role = ?1
                             ORDER BY created_at DESC, id DESC LIMIT ?2",
                        )?;
                        stmt.query_map(rusqlite::params![role.as_str(), n as i64], |row| {
                            Ok(row_to_record(row))
                        })?
                        .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, role, content, metadata, embedding, created_at, updated_at
                             FROM memories ORDER BY created_at DESC, id DESC LIMIT ?1",
                        )?;
                        stmt.query_map(rusqlite::params![n as i64], |row| Ok(row_to_record(row)))?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                };
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Flag every reflection attached to `message_id` as stale.
    ///
    /// Nothing is deleted; the `stale` metadata flag tells readers the
    /// reflection predates an edit of the conversation it reviewed.
    /// Returns the number of reflections flagged.
    pub async fn mark_reflections_stale(&self, message_id: i64) -> Result<usize, ReverieError> {
        let now = now_iso();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut flagged = 0usize;
                {
                    let mut stmt = tx.prepare(
                        "SELECT id, metadata FROM memories WHERE role = 'reflection'",
                    )?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    for (id, metadata_json) in rows {
                        let mut metadata: Map<String, Value> =
                            serde_json::from_str(&metadata_json).unwrap_or_default();
                        let linked = metadata
                            .get("message_id")
                            .and_then(Value::as_i64)
                            .is_some_and(|m| m == message_id);
                        if !linked {
                            continue;
                        }
                        metadata.insert("stale".to_string(), Value::Bool(true));
                        let updated = serde_json::to_string(&metadata)
                            .unwrap_or_else(|_| metadata_json.clone());
                        tx.execute(
                            "UPDATE memories SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
                            rusqlite::params![id, updated, now],
                        )?;
                        flagged += 1;
                    }
                }
                tx.commit()?;
                Ok(flagged)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Ids of assistant replies whose metadata links them to `user_id`.
    pub async fn replies_to(&self, user_id: i64) -> Result<Vec<i64>, ReverieError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, metadata FROM memories WHERE role = 'assistant'")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let ids = rows
                    .into_iter()
                    .filter(|(_, metadata_json)| {
                        serde_json::from_str::<Map<String, Value>>(metadata_json)
                            .ok()
                            .and_then(|m| m.get("reply_to").and_then(Value::as_i64))
                            .is_some_and(|linked| linked == user_id)
                    })
                    .map(|(id, _)| id)
                    .collect();
                Ok(ids)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Remove every record. Ids are not reused afterwards (AUTOINCREMENT).
    pub async fn reset(&self) -> Result<(), ReverieError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute("DELETE FROM memories", [])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Load every record that has an embedding, optionally role-filtered.
    async fn load_embedded(
        &self,
        role: Option<MemoryRole>,
    ) -> Result<Vec<MemoryRecord>, ReverieError> {
        self.db
            .connection()
            .call(move |conn| {
                let records = match role {
                    Some(role) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, role, content, metadata, embedding, created_at, updated_at
                             FROM memories WHERE embedding IS NOT NULL AND role = ?1",
                        )?;
                        stmt.query_map(rusqlite::params![role.as_str()], |row| {
                            Ok(row_to_record(row))
                        })?
                        .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, role, content, metadata, embedding, created_at, updated_at
                             FROM memories WHERE embedding IS NOT NULL",
                        )?;
                        stmt.query_map([], |row| Ok(row_to_record(row)))?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                };
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a rusqlite row to a MemoryRecord. Lenient on malformed metadata.
fn row_to_record(row: &rusqlite::Row) -> MemoryRecord {
    let role_str: String = row.get(1).unwrap_or_default();
    let metadata_json: String = row.get(3).unwrap_or_default();
    let embedding_blob: Option<Vec<u8>> = row.get(4).unwrap_or(None);

    MemoryRecord {
        id: row.get(0).unwrap_or_default(),
        role: MemoryRole::from_str_value(&role_str),
        content: row.get(2).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        embedding: embedding_blob.as_deref().map(blob_to_vec),
        created_at: row.get(5).unwrap_or_default(),
        updated_at: row.get(6).unwrap_or_default(),
    }
}

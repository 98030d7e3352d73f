// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context retrieval over the memory store.
//!
//! Retrieval is strictly best-effort: a conversation turn must never fail
//! because memory could not be searched. Any backend failure degrades to an
//! empty result and a warning.

use std::sync::Arc;

use reverie_config::model::MemoryConfig;
use tracing::{debug, warn};

use crate::service::EmbeddingService;
use crate::store::MemoryStore;
use crate::types::ScoredMemory;

/// Best-effort semantic retriever.
pub struct Retriever {
    store: Arc<MemoryStore>,
    embeddings: Arc<EmbeddingService>,
    max_results: usize,
    relevance_threshold: f32,
}

impl Retriever {
    pub fn new(
        store: Arc<MemoryStore>,
        embeddings: Arc<EmbeddingService>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            max_results: config.max_results,
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Retrieve the memories most relevant to `query`.
    ///
    /// Returns at most `memory.max_results` records, each scoring at least
    /// `memory.relevance_threshold`, ordered by similarity descending with
    /// newer records first on ties. Never fails: embedding or store errors
    /// yield an empty list.
    pub async fn retrieve(&self, query: &str) -> Vec<ScoredMemory> {
        let vector = match self.embeddings.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "retrieval skipped: query could not be embedded");
                return Vec::new();
            }
        };

        let scored = match self
            .store
            .query_nearest(&vector, self.max_results, None)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "retrieval skipped: store scan failed");
                return Vec::new();
            }
        };

        let kept: Vec<ScoredMemory> = scored
            .into_iter()
            .filter(|s| s.score >= self.relevance_threshold)
            .collect();
        debug!(results = kept.len(), "memory retrieval complete");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryRole;
    use reverie_storage::Database;
    use reverie_test_utils::{FailingEmbedder, HashEmbedder};
    use serde_json::Map;

    fn memory_config() -> MemoryConfig {
        MemoryConfig::default()
    }

    async fn seeded_retriever() -> Retriever {
        let db = Database::open_in_memory().await.unwrap();
        let service = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder::new(128)),
            None,
            128,
        ));
        let store = Arc::new(MemoryStore::new(db, service.clone()));

        store
            .insert(MemoryRole::User, "My dog's name is Max.", Map::new())
            .await
            .unwrap();
        store
            .insert(MemoryRole::User, "I moved to Lisbon last spring.", Map::new())
            .await
            .unwrap();

        Retriever::new(store, service, &memory_config())
    }

    #[tokio::test]
    async fn retrieves_the_relevant_fact() {
        let retriever = seeded_retriever().await;
        let results = retriever.retrieve("What is my dog's name?").await;
        assert!(!results.is_empty());
        assert_eq!(results[0].memory.content, "My dog's name is Max.");
        assert!(results[0].score >= 0.35);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_results() {
        let db = Database::open_in_memory().await.unwrap();
        let service = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder::new(128)),
            None,
            128,
        ));
        let store = Arc::new(MemoryStore::new(db, service.clone()));
        let retriever = Retriever::new(store, service, &memory_config());

        assert!(retriever.retrieve("anything at all").await.is_empty());
    }

    #[tokio::test]
    async fn embedding_outage_degrades_to_empty_not_error() {
        let db = Database::open_in_memory().await.unwrap();
        let write_service = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder::new(128)),
            None,
            128,
        ));
        let store = Arc::new(MemoryStore::new(db, write_service));
        store
            .insert(MemoryRole::User, "My dog's name is Max.", Map::new())
            .await
            .unwrap();

        // Query-side embedder is down; retrieval must not propagate it.
        let dead_service = Arc::new(EmbeddingService::new(
            Arc::new(FailingEmbedder::new()),
            None,
            128,
        ));
        let retriever = Retriever::new(store, dead_service, &memory_config());
        assert!(retriever.retrieve("What is my dog's name?").await.is_empty());
    }

    #[tokio::test]
    async fn low_similarity_results_are_dropped() {
        let retriever = seeded_retriever().await;
        let results = retriever
            .retrieve("quarterly derivatives settlement window")
            .await;
        for s in &results {
            assert!(s.score >= 0.35);
        }
    }
}

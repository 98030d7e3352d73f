// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persona lifecycle and system prompt assembly.
//!
//! The persona row mirrors the config at startup. Its seed memories (the
//! character description and standing goals) are written exactly once,
//! guarded by the `seeded` flag, so a reset of the memory table does not
//! silently resurrect them with new ids on every launch.

use serde_json::{Map, Value};
use tracing::info;

use reverie_config::model::PersonaConfig;
use reverie_core::ReverieError;
use reverie_memory::types::{MemoryRole, ScoredMemory};
use reverie_memory::MemoryStore;
use reverie_storage::queries::personas;
use reverie_storage::{Database, Persona};

/// Sync the persona row with config and seed its memories on first run.
pub async fn ensure_persona(
    db: &Database,
    store: &MemoryStore,
    config: &PersonaConfig,
) -> Result<Persona, ReverieError> {
    let goals_json = serde_json::to_string(&config.goals)
        .map_err(|e| ReverieError::Internal(format!("failed to encode persona goals: {e}")))?;
    let persona =
        personas::upsert_persona(db, &config.name, &config.description, &goals_json).await?;

    if persona.seeded {
        return Ok(persona);
    }

    info!(persona = %persona.name, "seeding persona memories");
    let mut metadata = Map::new();
    metadata.insert("seed".to_string(), Value::Bool(true));

    store
        .insert(
            MemoryRole::Reflection,
            &format!("I am {}. {}", config.name, config.description),
            metadata.clone(),
        )
        .await?;
    for goal in &config.goals {
        store
            .insert(
                MemoryRole::Reflection,
                &format!("Standing goal: {goal}"),
                metadata.clone(),
            )
            .await?;
    }

    personas::mark_seeded(db, persona.id).await?;
    personas::get_persona(db, &persona.name)
        .await?
        .ok_or_else(|| ReverieError::Internal("persona vanished during seeding".into()))
}

/// Assemble the system prompt from the persona and retrieved memories.
///
/// Stale memories are labeled rather than dropped; the model should know a
/// recollection predates an edit.
pub fn system_prompt(config: &PersonaConfig, memories: &[ScoredMemory]) -> String {
    let mut prompt = format!("You are {}. {}", config.name, config.description);

    if !config.goals.is_empty() {
        prompt.push_str("\n\nYour standing goals:");
        for goal in &config.goals {
            prompt.push_str(&format!("\n- {goal}"));
        }
    }

    if !memories.is_empty() {
        prompt.push_str("\n\nRelevant memories from past conversations:");
        for scored in memories {
            let marker = if scored.memory.flag("stale") {
                " (may be outdated, the conversation was edited)"
            } else {
                ""
            };
            prompt.push_str(&format!(
                "\n- [{}] {}{marker}",
                scored.memory.role.as_str(),
                scored.memory.content
            ));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reverie_memory::service::EmbeddingService;
    use reverie_memory::types::MemoryRecord;
    use reverie_test_utils::HashEmbedder;

    async fn fixtures() -> (Database, MemoryStore) {
        let db = Database::open_in_memory().await.unwrap();
        let service = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder::new(128)),
            None,
            128,
        ));
        let store = MemoryStore::new(db.clone(), service);
        (db, store)
    }

    #[tokio::test]
    async fn seeds_once_even_across_restarts() {
        let (db, store) = fixtures().await;
        let config = PersonaConfig::default();

        let persona = ensure_persona(&db, &store, &config).await.unwrap();
        assert!(persona.seeded);
        let after_first = store.list_recent(50, None).await.unwrap().len();
        assert_eq!(after_first, 1 + config.goals.len());

        // Second startup: no duplicate seeds.
        ensure_persona(&db, &store, &config).await.unwrap();
        let after_second = store.list_recent(50, None).await.unwrap().len();
        assert_eq!(after_second, after_first);
    }

    #[tokio::test]
    async fn config_changes_refresh_the_persona_row() {
        let (db, store) = fixtures().await;
        let mut config = PersonaConfig::default();
        let first = ensure_persona(&db, &store, &config).await.unwrap();

        config.description = "Someone new entirely.".to_string();
        let second = ensure_persona(&db, &store, &config).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.description, "Someone new entirely.");
    }

    fn scored(content: &str, stale: bool) -> ScoredMemory {
        let mut metadata = Map::new();
        if stale {
            metadata.insert("stale".to_string(), Value::Bool(true));
        }
        ScoredMemory {
            memory: MemoryRecord {
                id: 1,
                role: MemoryRole::User,
                content: content.to_string(),
                metadata,
                embedding: None,
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn prompt_contains_persona_goals_and_memories() {
        let config = PersonaConfig::default();
        let prompt = system_prompt(&config, &[scored("My dog's name is Max.", false)]);
        assert!(prompt.contains(&config.name));
        assert!(prompt.contains("Standing goals:") || prompt.contains("standing goals:"));
        assert!(prompt.contains("My dog's name is Max."));
        assert!(!prompt.contains("outdated"));
    }

    #[test]
    fn stale_memories_are_labeled_not_hidden() {
        let config = PersonaConfig::default();
        let prompt = system_prompt(&config, &[scored("My dog's name is Max.", true)]);
        assert!(prompt.contains("My dog's name is Max."));
        assert!(prompt.contains("may be outdated"));
    }

    #[test]
    fn prompt_without_memories_omits_the_section() {
        let config = PersonaConfig::default();
        let prompt = system_prompt(&config, &[]);
        assert!(!prompt.contains("Relevant memories"));
    }
}

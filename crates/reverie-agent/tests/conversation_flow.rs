// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end conversation flow over the full agent stack: real SQLite
//! (in-memory), real store and retriever, deterministic embedder, and a
//! scripted provider.

use std::sync::Arc;

use reverie_agent::persona::ensure_persona;
use reverie_agent::{Conversation, Reflector};
use reverie_config::model::{LlmConfig, MemoryConfig, PersonaConfig, ReflectionConfig};
use reverie_core::ReverieError;
use reverie_core::traits::EmbeddingAdapter;
use reverie_memory::service::EmbeddingService;
use reverie_memory::types::MemoryRole;
use reverie_memory::{MemoryStore, Retriever};
use reverie_storage::Database;
use reverie_test_utils::{FailingEmbedder, HashEmbedder, MockProvider};

struct Stack {
    conversation: Conversation,
    store: Arc<MemoryStore>,
    provider: Arc<MockProvider>,
    db: Database,
}

async fn stack_with_embedder(embedder: Arc<dyn EmbeddingAdapter>) -> Stack {
    let db = Database::open_in_memory().await.unwrap();
    let service = Arc::new(EmbeddingService::new(embedder, None, 128));
    let store = Arc::new(MemoryStore::new(db.clone(), service.clone()));
    let retriever = Retriever::new(store.clone(), service, &MemoryConfig::default());
    let provider = Arc::new(MockProvider::new());
    let reflector = Reflector::new(
        provider.clone(),
        &LlmConfig::default(),
        &ReflectionConfig::default(),
    );
    let conversation = Conversation::new(
        store.clone(),
        retriever,
        reflector,
        PersonaConfig::default(),
    );
    Stack {
        conversation,
        store,
        provider,
        db,
    }
}

async fn stack() -> Stack {
    stack_with_embedder(Arc::new(HashEmbedder::new(128))).await
}

async fn script_turn(provider: &MockProvider, reply: &str) {
    provider
        .push_response(format!("<reply>{reply}</reply>"))
        .await;
    provider.push_response("ACCEPT").await;
}

#[tokio::test]
async fn facts_from_earlier_turns_are_recalled_later() {
    let s = stack().await;

    script_turn(&s.provider, "Got it, Max is a great name.").await;
    s.conversation
        .handle_turn("My dog's name is Max.")
        .await
        .unwrap();

    script_turn(&s.provider, "Your dog's name is Max.").await;
    let outcome = s
        .conversation
        .handle_turn("What is my dog's name?")
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Your dog's name is Max.");
    assert!(outcome.memories_used > 0);

    // The second draft's system prompt carried the stored fact.
    let requests = s.provider.recorded_requests().await;
    let second_draft_system = &requests[2].messages[0].content;
    assert!(second_draft_system.contains("My dog's name is Max."));
}

#[tokio::test]
async fn persona_seeding_survives_memory_reset() {
    let s = stack().await;
    let config = PersonaConfig::default();

    ensure_persona(&s.db, &s.store, &config).await.unwrap();
    let seeded = s.store.list_recent(50, None).await.unwrap().len();
    assert_eq!(seeded, 1 + config.goals.len());

    s.conversation.reset().await.unwrap();

    // The seeded flag lives on the persona row, not the memories, so a
    // second startup does not resurrect the seeds.
    ensure_persona(&s.db, &s.store, &config).await.unwrap();
    assert!(s.store.list_recent(50, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn edit_then_retrieve_surfaces_new_content_and_stale_reflection() {
    let s = stack().await;

    script_turn(&s.provider, "Noted.").await;
    let outcome = s
        .conversation
        .handle_turn("My dog's name is Max.")
        .await
        .unwrap();

    s.conversation
        .edit_message(outcome.user_id, "My dog's name is Rex.")
        .await
        .unwrap();

    // Retrieval sees the edited content, re-embedded synchronously.
    let query_service = EmbeddingService::new(Arc::new(HashEmbedder::new(128)), None, 128);
    let query = query_service
        .embed("My dog's name is Rex.")
        .await
        .unwrap();
    let results = s
        .store
        .query_nearest(&query, 1, Some(MemoryRole::User))
        .await
        .unwrap();
    assert_eq!(results[0].memory.content, "My dog's name is Rex.");
    assert!((results[0].score - 1.0).abs() < 1e-5);

    // The reflection of the now-outdated reply is flagged, not deleted.
    let reflection = s.store.get(outcome.reflection_id).await.unwrap().unwrap();
    assert!(reflection.flag("stale"));
    assert_eq!(s.store.list_recent(10, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn embedding_outage_degrades_but_never_blocks_turns() {
    let s = stack_with_embedder(Arc::new(FailingEmbedder::new())).await;

    script_turn(&s.provider, "Hello!").await;
    let outcome = s.conversation.handle_turn("Hi there.").await.unwrap();
    assert_eq!(outcome.reply, "Hello!");
    assert_eq!(outcome.memories_used, 0);

    // All three records landed despite the outage; none are searchable.
    let records = s.store.list_recent(10, None).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.embedding.is_none()));
}

#[tokio::test]
async fn review_failure_mid_turn_still_delivers_and_persists() {
    let s = stack().await;
    s.provider
        .push_response("<reply>Best effort reply.</reply>")
        .await;
    s.provider.push_failure("provider went away").await;

    let outcome = s.conversation.handle_turn("Hello?").await.unwrap();
    assert_eq!(outcome.reply, "Best effort reply.");

    let reflection = s.store.get(outcome.reflection_id).await.unwrap().unwrap();
    assert_eq!(reflection.role, MemoryRole::Reflection);
    assert!(reflection.content.contains("review skipped"));
}

#[tokio::test]
async fn update_of_unknown_record_propagates_not_found() {
    let s = stack().await;
    let err = s.conversation.edit_message(9999, "x").await.unwrap_err();
    assert!(matches!(err, ReverieError::NotFound { id: 9999 }));
}

// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation controller.
//!
//! Orchestrates one turn: persist the user message, retrieve context,
//! run the review loop, persist the reply and its reflection record.
//! Metadata back-references stitch the three records together: the
//! assistant row carries `reply_to` (the user row id), the reflection row
//! carries `message_id` (the assistant row id).

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use reverie_config::model::PersonaConfig;
use reverie_core::ReverieError;
use reverie_core::types::ChatMessage;
use reverie_memory::types::{MemoryRecord, MemoryRole};
use reverie_memory::{MemoryStore, Retriever};

use crate::persona::system_prompt;
use crate::reflector::Reflector;

/// How many recent turns ride along as literal conversation history.
const HISTORY_WINDOW: usize = 6;

/// Everything produced by one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_id: i64,
    pub assistant_id: i64,
    pub reflection_id: i64,
    pub reply: String,
    pub follow_up: Option<String>,
    pub memories_used: usize,
    pub review_cycles: u32,
}

/// Drives conversation turns end to end.
pub struct Conversation {
    store: Arc<MemoryStore>,
    retriever: Retriever,
    reflector: Reflector,
    persona: PersonaConfig,
}

impl Conversation {
    pub fn new(
        store: Arc<MemoryStore>,
        retriever: Retriever,
        reflector: Reflector,
        persona: PersonaConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            reflector,
            persona,
        }
    }

    /// Handle one user message and return the reviewed reply.
    ///
    /// The user message is persisted before anything can fail downstream,
    /// so a generation failure never loses what the user said.
    pub async fn handle_turn(&self, user_text: &str) -> Result<TurnOutcome, ReverieError> {
        let history = self.recent_history().await;

        let user_record = self
            .store
            .insert(MemoryRole::User, user_text, Map::new())
            .await?;

        let memories = self.retriever.retrieve(user_text).await;
        let prompt = system_prompt(&self.persona, &memories);

        let mut conversation = history;
        conversation.push(ChatMessage::user(user_text));

        let outcome = self.reflector.run(&prompt, conversation).await?;

        let mut reply_metadata = Map::new();
        reply_metadata.insert("reply_to".to_string(), Value::from(user_record.id));
        let assistant_record = self
            .store
            .insert(MemoryRole::Assistant, &outcome.reply, reply_metadata)
            .await?;

        let mut reflection_metadata = Map::new();
        reflection_metadata.insert("message_id".to_string(), Value::from(assistant_record.id));
        reflection_metadata.insert("cycles".to_string(), Value::from(outcome.cycles));
        if let Some(follow_up) = &outcome.follow_up {
            reflection_metadata.insert("follow_up".to_string(), Value::from(follow_up.clone()));
        }
        let reflection_record = self
            .store
            .insert(MemoryRole::Reflection, &outcome.notes, reflection_metadata)
            .await?;

        info!(
            user_id = user_record.id,
            assistant_id = assistant_record.id,
            reflection_id = reflection_record.id,
            cycles = outcome.cycles,
            memories = memories.len(),
            "turn complete"
        );

        Ok(TurnOutcome {
            user_id: user_record.id,
            assistant_id: assistant_record.id,
            reflection_id: reflection_record.id,
            reply: outcome.reply,
            follow_up: outcome.follow_up,
            memories_used: memories.len(),
            review_cycles: outcome.cycles,
        })
    }

    /// Rewrite a past message in place.
    ///
    /// Editing never deletes anything. Reflections that reviewed the edited
    /// conversation are flagged stale: editing a user message flags the
    /// reflections of every assistant reply to it; editing an assistant
    /// message flags its own reflections.
    pub async fn edit_message(&self, id: i64, content: &str) -> Result<MemoryRecord, ReverieError> {
        let updated = self.store.update(id, content).await?;

        let affected: Vec<i64> = match updated.role {
            MemoryRole::User => self.store.replies_to(id).await?,
            MemoryRole::Assistant => vec![id],
            MemoryRole::Reflection => Vec::new(),
        };

        for message_id in affected {
            let flagged = self.store.mark_reflections_stale(message_id).await?;
            if flagged > 0 {
                warn!(
                    edited = id,
                    message_id, flagged, "reflections flagged stale after edit"
                );
            }
        }
        Ok(updated)
    }

    /// Most recent records, newest first.
    pub async fn memories(&self, n: usize) -> Result<Vec<MemoryRecord>, ReverieError> {
        self.store.list_recent(n, None).await
    }

    /// Wipe every memory. Ids are never reused afterwards.
    pub async fn reset(&self) -> Result<(), ReverieError> {
        self.store.reset().await
    }

    /// Last few user/assistant turns, oldest first, as chat messages.
    async fn recent_history(&self) -> Vec<ChatMessage> {
        let recent = match self.store.list_recent(HISTORY_WINDOW * 2, None).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "history unavailable, continuing without it");
                return Vec::new();
            }
        };

        let mut turns: Vec<ChatMessage> = recent
            .into_iter()
            .filter_map(|record| match record.role {
                MemoryRole::User => Some(ChatMessage::user(record.content)),
                MemoryRole::Assistant => Some(ChatMessage::assistant(record.content)),
                MemoryRole::Reflection => None,
            })
            .take(HISTORY_WINDOW)
            .collect();
        turns.reverse();
        turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reverie_config::model::{LlmConfig, MemoryConfig, ReflectionConfig};
    use reverie_memory::service::EmbeddingService;
    use reverie_storage::Database;
    use reverie_test_utils::{HashEmbedder, MockProvider};

    struct Fixture {
        conversation: Conversation,
        store: Arc<MemoryStore>,
        provider: Arc<MockProvider>,
    }

    async fn fixture(provider: MockProvider) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let service = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder::new(128)),
            None,
            128,
        ));
        let store = Arc::new(MemoryStore::new(db, service.clone()));
        let retriever = Retriever::new(store.clone(), service, &MemoryConfig::default());
        let provider = Arc::new(provider);
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
        Fixture {
            conversation,
            store,
            provider,
        }
    }

    fn accepting(reply: &str) -> MockProvider {
        MockProvider::with_responses(vec![
            format!("<reply>{reply}</reply>"),
            "ACCEPT".to_string(),
        ])
    }

    #[tokio::test]
    async fn a_turn_persists_three_linked_records() {
        let f = fixture(accepting("Hello!")).await;
        let outcome = f.conversation.handle_turn("Hi there.").await.unwrap();

        assert_eq!(outcome.reply, "Hello!");

        let assistant = f.store.get(outcome.assistant_id).await.unwrap().unwrap();
        assert_eq!(assistant.role, MemoryRole::Assistant);
        assert_eq!(assistant.metadata_id("reply_to"), Some(outcome.user_id));

        let reflection = f.store.get(outcome.reflection_id).await.unwrap().unwrap();
        assert_eq!(reflection.role, MemoryRole::Reflection);
        assert_eq!(
            reflection.metadata_id("message_id"),
            Some(outcome.assistant_id)
        );
        assert!(!reflection.flag("stale"));
    }

    #[tokio::test]
    async fn retrieved_facts_reach_the_system_prompt() {
        let f = fixture(accepting("His name is Max.")).await;
        f.store
            .insert(MemoryRole::User, "My dog's name is Max.", Map::new())
            .await
            .unwrap();

        f.conversation
            .handle_turn("What is my dog's name?")
            .await
            .unwrap();

        let requests = f.provider.recorded_requests().await;
        let draft_system = &requests[0].messages[0];
        assert!(draft_system.content.contains("My dog's name is Max."));
    }

    #[tokio::test]
    async fn generation_failure_keeps_the_user_message() {
        let provider = MockProvider::new();
        provider.push_failure("backend down").await;
        let f = fixture(provider).await;

        let err = f.conversation.handle_turn("Hi there.").await.unwrap_err();
        assert!(matches!(err, ReverieError::GenerationFailed { .. }));

        let records = f.store.list_recent(10, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, MemoryRole::User);
        assert_eq!(records[0].content, "Hi there.");
    }

    #[tokio::test]
    async fn editing_a_user_message_flags_downstream_reflections() {
        let f = fixture(accepting("Noted!")).await;
        let outcome = f.conversation.handle_turn("My dog is Max.").await.unwrap();

        f.conversation
            .edit_message(outcome.user_id, "My dog is Rex.")
            .await
            .unwrap();

        let user = f.store.get(outcome.user_id).await.unwrap().unwrap();
        assert_eq!(user.content, "My dog is Rex.");

        let reflection = f.store.get(outcome.reflection_id).await.unwrap().unwrap();
        assert!(reflection.flag("stale"));

        // Nothing was deleted.
        assert_eq!(f.store.list_recent(10, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn editing_an_assistant_message_flags_its_own_reflections() {
        let f = fixture(accepting("Original reply.")).await;
        let outcome = f.conversation.handle_turn("Hello.").await.unwrap();

        f.conversation
            .edit_message(outcome.assistant_id, "Corrected reply.")
            .await
            .unwrap();

        let reflection = f.store.get(outcome.reflection_id).await.unwrap().unwrap();
        assert!(reflection.flag("stale"));
    }

    #[tokio::test]
    async fn editing_a_missing_message_is_not_found() {
        let f = fixture(MockProvider::new()).await;
        let err = f.conversation.edit_message(404, "nothing").await.unwrap_err();
        assert!(matches!(err, ReverieError::NotFound { id: 404 }));
    }

    #[tokio::test]
    async fn history_rides_along_on_later_turns() {
        let provider = MockProvider::with_responses(vec![
            "<reply>Nice to meet you, Sam.</reply>".to_string(),
            "ACCEPT".to_string(),
            "<reply>You said Sam.</reply>".to_string(),
            "ACCEPT".to_string(),
        ]);
        let f = fixture(provider).await;

        f.conversation.handle_turn("I'm Sam.").await.unwrap();
        f.conversation
            .handle_turn("What did I say my name was?")
            .await
            .unwrap();

        let requests = f.provider.recorded_requests().await;
        // Third call is the second turn's draft; it carries the first
        // exchange as history before the new user message.
        let second_draft = &requests[2];
        let contents: Vec<&str> = second_draft
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.iter().any(|c| c.contains("I'm Sam.")));
        assert!(contents.iter().any(|c| c.contains("Nice to meet you, Sam.")));
    }

    #[tokio::test]
    async fn reset_empties_the_store() {
        let f = fixture(accepting("Hello!")).await;
        f.conversation.handle_turn("Hi.").await.unwrap();
        f.conversation.reset().await.unwrap();
        assert!(f.conversation.memories(10).await.unwrap().is_empty());
    }
}

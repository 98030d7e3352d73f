// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-review loop: draft, critique, refine.
//!
//! Every reply passes through a bounded review loop before the user sees
//! it. The model first drafts, then judges its own draft, and optionally
//! rewrites it. The loop fails open: once any draft exists, provider
//! failures accept the best candidate so far instead of erroring the turn.

use std::fmt;
use std::sync::Arc;

use strum::Display;
use tracing::{debug, warn};

use reverie_config::model::{LlmConfig, ReflectionConfig};
use reverie_core::ReverieError;
use reverie_core::traits::CompletionAdapter;
use reverie_core::types::{ChatMessage, ProviderRequest};

use crate::tags::{Draft, parse_draft};

/// Instructions appended to the system prompt for the drafting call.
const DRAFT_FORMAT: &str = "\
Respond using exactly this structure:
<thinking>your private reasoning, never shown to the user</thinking>
<reply>the message the user will see</reply>
<follow_up>one question you want to ask later, or leave empty</follow_up>";

const CRITIQUE_INSTRUCTIONS: &str = "\
You are reviewing a draft reply you wrote. If it is accurate, grounded in \
the conversation, and in character, respond with the single word ACCEPT. \
Otherwise respond with a short critique of what to fix. Never rewrite the \
draft yourself.";

const REFINE_INSTRUCTIONS: &str = "\
Rewrite your draft reply to address the critique. Keep what the critique \
did not object to.";

/// Where the review loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum Phase {
    Drafting,
    Critiquing,
    Refining,
    Done,
}

/// The finished product of one review loop.
#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    /// The accepted user-visible reply.
    pub reply: String,
    /// Private reasoning captured from the accepted draft.
    pub thinking: Option<String>,
    /// Question the agent wants to raise next turn.
    pub follow_up: Option<String>,
    /// Review trail, stored as the reflection record's content.
    pub notes: String,
    /// Critique rounds actually run.
    pub cycles: u32,
}

/// Runs the draft/critique/refine loop against a completion adapter.
pub struct Reflector {
    provider: Arc<dyn CompletionAdapter>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_cycles: u32,
    review_max_tokens: u32,
}

impl fmt::Debug for Reflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflector")
            .field("model", &self.model)
            .field("max_cycles", &self.max_cycles)
            .finish_non_exhaustive()
    }
}

impl Reflector {
    pub fn new(
        provider: Arc<dyn CompletionAdapter>,
        llm: &LlmConfig,
        reflection: &ReflectionConfig,
    ) -> Self {
        Self {
            provider,
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            max_cycles: reflection.max_cycles,
            review_max_tokens: reflection.max_tokens,
        }
    }

    /// Produce a reviewed reply for the given conversation.
    ///
    /// Fails only when no draft could be produced at all. Once a draft
    /// exists, critique or refinement failures log a warning and accept
    /// the latest candidate.
    pub async fn run(
        &self,
        system_prompt: &str,
        conversation: Vec<ChatMessage>,
    ) -> Result<ReflectionOutcome, ReverieError> {
        let mut phase = Phase::Drafting;
        debug!(%phase, "review loop started");

        let mut candidate = self.draft(system_prompt, &conversation).await?;
        let mut notes: Vec<String> = Vec::new();
        if let Some(thinking) = &candidate.thinking {
            notes.push(format!("draft reasoning: {thinking}"));
        }

        let mut cycles = 0u32;
        for cycle in 1..=self.max_cycles {
            phase = Phase::Critiquing;
            debug!(%phase, cycle, "reviewing draft");
            cycles = cycle;

            let verdict = match self.critique(&conversation, &candidate.reply).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, cycle, "critique unavailable, accepting current draft");
                    notes.push(format!("cycle {cycle}: review skipped ({e})"));
                    break;
                }
            };

            if verdict.trim().to_uppercase().starts_with("ACCEPT") {
                notes.push(format!("cycle {cycle}: accepted"));
                break;
            }
            notes.push(format!("cycle {cycle}: critique: {}", verdict.trim()));

            phase = Phase::Refining;
            debug!(%phase, cycle, "refining draft");
            match self
                .refine(system_prompt, &conversation, &candidate.reply, &verdict)
                .await
            {
                Ok(refined) if !refined.reply.is_empty() => {
                    candidate = refined;
                }
                Ok(_) => {
                    warn!(cycle, "refinement produced an empty reply, keeping current draft");
                }
                Err(e) => {
                    warn!(error = %e, cycle, "refinement unavailable, accepting current draft");
                    notes.push(format!("cycle {cycle}: refinement skipped ({e})"));
                    break;
                }
            }
        }
        if cycles == self.max_cycles
            && !notes.last().is_some_and(|n| n.ends_with("accepted"))
        {
            notes.push(format!("review budget exhausted after {cycles} cycles"));
        }

        phase = Phase::Done;
        debug!(%phase, cycles, "review loop finished");

        Ok(ReflectionOutcome {
            reply: candidate.reply,
            thinking: candidate.thinking,
            follow_up: candidate.follow_up,
            notes: notes.join("\n"),
            cycles,
        })
    }

    async fn draft(
        &self,
        system_prompt: &str,
        conversation: &[ChatMessage],
    ) -> Result<Draft, ReverieError> {
        let mut messages =
            vec![ChatMessage::system(format!("{system_prompt}\n\n{DRAFT_FORMAT}"))];
        messages.extend_from_slice(conversation);

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
            })
            .await?;

        let draft = parse_draft(&response.text);
        if draft.reply.is_empty() {
            return Err(ReverieError::GenerationFailed {
                message: "draft contained no usable reply".into(),
                source: None,
            });
        }
        Ok(draft)
    }

    async fn critique(
        &self,
        conversation: &[ChatMessage],
        reply: &str,
    ) -> Result<String, ReverieError> {
        let last_user = conversation
            .iter()
            .rev()
            .find(|m| m.role == reverie_core::types::ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let messages = vec![
            ChatMessage::system(CRITIQUE_INSTRUCTIONS),
            ChatMessage::user(format!(
                "The user said:\n{last_user}\n\nYour draft reply:\n{reply}"
            )),
        ];

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                max_tokens: Some(self.review_max_tokens),
                temperature: Some(0.0),
            })
            .await?;
        Ok(response.text)
    }

    async fn refine(
        &self,
        system_prompt: &str,
        conversation: &[ChatMessage],
        reply: &str,
        critique: &str,
    ) -> Result<Draft, ReverieError> {
        let mut messages =
            vec![ChatMessage::system(format!("{system_prompt}\n\n{DRAFT_FORMAT}"))];
        messages.extend_from_slice(conversation);
        messages.push(ChatMessage::assistant(reply));
        messages.push(ChatMessage::user(format!(
            "{REFINE_INSTRUCTIONS}\n\nCritique:\n{critique}"
        )));

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
            })
            .await?;
        Ok(parse_draft(&response.text))
    }
}

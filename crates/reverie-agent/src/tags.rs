// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for the structured draft format the model is prompted to emit.
//!
//! A draft carries its visible reply inside `<reply>` tags, private
//! reasoning inside `<thinking>`, and an optional `<follow_up>` question.
//! Models drift from the format under load, so parsing is lenient: a draft
//! with no tags at all is treated as a bare reply.

/// A parsed draft from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Private reasoning. Never shown to the user, kept in the reflection
    /// record.
    pub thinking: Option<String>,
    /// The user-visible reply.
    pub reply: String,
    /// A question the agent wants to ask next turn, if any.
    pub follow_up: Option<String>,
}

/// Parse a raw model completion into a [`Draft`].
pub fn parse_draft(text: &str) -> Draft {
    let thinking = extract_tag(text, "thinking");
    let follow_up = extract_tag(text, "follow_up").filter(|s| !s.is_empty());

    let reply = match extract_tag(text, "reply") {
        Some(reply) => reply,
        // No <reply> tag: strip the other tagged blocks and treat what
        // remains as the reply.
        None => {
            let mut remainder = text.to_string();
            for name in ["thinking", "follow_up"] {
                remainder = remove_tag_block(&remainder, name);
            }
            remainder.trim().to_string()
        }
    };

    Draft {
        thinking,
        reply: sanitize_reply(&reply),
        follow_up,
    }
}

/// Extract the trimmed contents of the first `<name>...</name>` block.
fn extract_tag(text: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_string())
}

/// Remove the first `<name>...</name>` block, including the tags.
fn remove_tag_block(text: &str, name: &str) -> String {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let Some(start) = text.find(&open) else {
        return text.to_string();
    };
    let Some(end_rel) = text[start..].find(&close) else {
        return text.to_string();
    };
    let end = start + end_rel + close.len();
    format!("{}{}", &text[..start], &text[end..])
}

/// Strip meta-commentary lines the model sometimes leaks into the reply.
///
/// Lines opening with markers like "analysis:" or "inner monologue:" are
/// reasoning that escaped the thinking block; the user never sees them.
pub fn sanitize_reply(reply: &str) -> String {
    const LEAK_MARKERS: &[&str] = &[
        "analysis:",
        "inner monologue:",
        "internal monologue:",
        "reasoning:",
        "critique:",
    ];

    reply
        .lines()
        .filter(|line| {
            let lowered = line.trim_start().to_lowercase();
            !LEAK_MARKERS.iter().any(|m| lowered.starts_with(m))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

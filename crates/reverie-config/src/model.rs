// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Reverie agent.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReverieConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Memory store and embedding settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persona identity settings.
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Self-review loop settings.
    #[serde(default)]
    pub reflection: ReflectionConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent process (used in logs, not the persona name).
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "reverie".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Which backend serves completions: "openai" or "ollama".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key. `None` requires the provider to accept unauthenticated
    /// requests (Ollama) or an environment override.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override. `None` uses the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

/// Memory store and embedding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Name of the local embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Dimensionality of stored embedding vectors.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Maximum memories returned per retrieval.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum cosine similarity for a memory to enter context (0.0-1.0).
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Embedding model identifier sent to the provider fallback.
    #[serde(default = "default_fallback_embedding_model")]
    pub fallback_embedding_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            max_results: default_max_results(),
            relevance_threshold: default_relevance_threshold(),
            fallback_embedding_model: default_fallback_embedding_model(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("reverie").join("reverie.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("reverie.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_embedding_dim() -> usize {
    384
}

fn default_max_results() -> usize {
    6
}

fn default_relevance_threshold() -> f32 {
    0.35
}

fn default_fallback_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Persona identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    /// Name the agent presents as.
    #[serde(default = "default_persona_name")]
    pub name: String,

    /// Short character description woven into the system prompt.
    #[serde(default = "default_persona_description")]
    pub description: String,

    /// Standing goals the persona pursues across conversations.
    #[serde(default = "default_persona_goals")]
    pub goals: Vec<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            description: default_persona_description(),
            goals: default_persona_goals(),
        }
    }
}

fn default_persona_name() -> String {
    "Avery".to_string()
}

fn default_persona_description() -> String {
    "A thoughtful companion with a dry sense of humor who remembers what matters to you."
        .to_string()
}

fn default_persona_goals() -> Vec<String> {
    vec![
        "Learn the user's preferences and recall them accurately".to_string(),
        "Keep replies grounded in what was actually said".to_string(),
    ]
}

/// Self-review loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReflectionConfig {
    /// Maximum critique/refine rounds per reply. Budget exhaustion accepts
    /// the latest candidate rather than erroring.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Max tokens for critique and refinement calls.
    #[serde(default = "default_reflection_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            max_tokens: default_reflection_max_tokens(),
        }
    }
}

fn default_max_cycles() -> u32 {
    2
}

fn default_reflection_max_tokens() -> u32 {
    512
}

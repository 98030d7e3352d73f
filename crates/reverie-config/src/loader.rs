// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./reverie.toml` > `~/.config/reverie/reverie.toml` > `/etc/reverie/reverie.toml`
//! with environment variable overrides via `REVERIE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ReverieConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/reverie/reverie.toml` (system-wide)
/// 3. `~/.config/reverie/reverie.toml` (user XDG config)
/// 4. `./reverie.toml` (local directory)
/// 5. `REVERIE_*` environment variables
pub fn load_config() -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file("/etc/reverie/reverie.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("reverie/reverie.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("reverie.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `REVERIE_LLM_API_KEY` must map to
/// `llm.api_key`, not `llm.api.key`.
fn env_provider() -> Env {
    Env::prefixed("REVERIE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: REVERIE_LLM_API_KEY -> "llm_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("memory_", "memory.", 1)
            .replacen("persona_", "persona.", 1)
            .replacen("reflection_", "reflection.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_cleanly() {
        let config = load_config_from_str("").expect("empty config should use defaults");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.memory.embedding_dim, 384);
        assert_eq!(config.memory.max_results, 6);
        assert!((config.memory.relevance_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.reflection.max_cycles, 2);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[llm]
provider = "ollama"
model = "llama3"
timeout_secs = 30

[memory]
max_results = 3
"#,
        )
        .expect("valid config");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.memory.max_results, 3);
        // Unset sections keep defaults.
        assert_eq!(config.persona.name, "Avery");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
[memory]
max_reuslts = 3
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn env_key_maps_to_section_dot_field() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("REVERIE_LLM_API_KEY", "sk-test");
            jail.set_env("REVERIE_MEMORY_MAX_RESULTS", "9");
            let config: ReverieConfig = Figment::new()
                .merge(Serialized::defaults(ReverieConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
            assert_eq!(config.memory.max_results, 9);
            Ok(())
        });
    }
}
